//! Usage: Open the authorization URL in the user's default browser.

use std::process::{Command, Stdio};

#[cfg(target_os = "linux")]
fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|version| {
            let version = version.to_ascii_lowercase();
            version.contains("microsoft") || version.contains("wsl")
        })
        .unwrap_or(false)
}

fn spawn_detached(program: &str, args: &[&str]) -> bool {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // cmd.exe warns about UNC working directories when launched from WSL.
    if program.ends_with(".exe") {
        command.current_dir("/mnt/c/");
    }
    match command.spawn() {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(program, "browser launcher unavailable: {}", err);
            false
        }
    }
}

/// `true` when a launcher accepted the URL. The browser itself may still fail.
pub(crate) fn open_browser(url: &str) -> bool {
    #[cfg(target_os = "windows")]
    {
        spawn_detached("cmd", &["/c", "start", "", url])
    }

    #[cfg(target_os = "macos")]
    {
        spawn_detached("open", &[url])
    }

    #[cfg(target_os = "linux")]
    {
        if is_wsl() {
            return spawn_detached("wslview", &[url])
                || spawn_detached("cmd.exe", &["/c", "start", "", url]);
        }
        spawn_detached("xdg-open", &[url])
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
        false
    }
}
