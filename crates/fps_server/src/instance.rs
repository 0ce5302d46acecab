//! Instância única – encerra execuções anteriores do mesmo executável.
//!
//! Evita duas cópias disputando a porta HTTP depois de um restart.

use std::ffi::{OsStr, OsString};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Nome do executável atual (ex: `fps_tray.exe`).
fn current_exe_name() -> Option<OsString> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(OsStr::to_os_string))
}

/// PIDs de outros processos com o nome `exe_name`, excluindo `own_pid`.
fn previous_instances(sys: &System, exe_name: &OsStr, own_pid: Pid) -> Vec<Pid> {
    sys.processes_by_exact_name(exe_name)
        .map(|p| p.pid())
        .filter(|&pid| pid != own_pid)
        .collect()
}

/// Mata instâncias anteriores. Retorna quantas foram encerradas.
///
/// Qualquer falha é só logada: a inicialização continua de qualquer jeito.
pub fn kill_existing_instances() -> usize {
    let Ok(own_pid) = sysinfo::get_current_pid() else {
        warn!("Não foi possível obter o PID atual");
        return 0;
    };
    let Some(exe_name) = current_exe_name() else {
        warn!("Não foi possível obter o nome do executável");
        return 0;
    };

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed = 0;
    for pid in previous_instances(&sys, &exe_name, own_pid) {
        let Some(process) = sys.process(pid) else {
            continue;
        };
        info!(
            "Encerrando instância anterior de {} (PID: {pid})",
            exe_name.to_string_lossy()
        );
        if process.kill() {
            killed += 1;
        } else {
            warn!("Falha ao encerrar PID {pid}");
        }
    }

    if killed > 0 {
        // Tempo para o SO liberar a porta
        std::thread::sleep(Duration::from_millis(100));
    } else {
        debug!("Nenhuma instância anterior encontrada");
    }

    killed
}
