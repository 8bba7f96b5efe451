use quicknotes_lib::app::{app_state::AppState, logging, popup::PopupSession};
use quicknotes_lib::app::messages::{PopupMessage, PopupReply};
use quicknotes_lib::{app_paths, settings};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn write_reply(stdout: &mut tokio::io::Stdout, reply: &PopupReply) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(reply).map_err(std::io::Error::other)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let data_dir = match app_paths::app_data_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("quicknotes: {err}");
            return ExitCode::FAILURE;
        }
    };
    let settings = match settings::read(&data_dir) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("quicknotes: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _logging = logging::init(&data_dir, settings.log_retention_days);

    let state = match AppState::bootstrap(&data_dir, &settings) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(code = err.code(), "startup failed: {}", err.message());
            return ExitCode::FAILURE;
        }
    };

    let mut popup = PopupSession::new(state);
    let mut stdout = tokio::io::stdout();

    let init = popup.init().await;
    if let Err(err) = write_reply(&mut stdout, &init).await {
        tracing::error!("stdout write failed: {}", err);
        return ExitCode::FAILURE;
    }

    // One JSON message per line in, one reply per line out.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::error!("stdin read failed: {}", err);
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match PopupMessage::decode(&line) {
            Ok(message) => popup.handle(message).await,
            Err(err) => PopupReply::failure(&err),
        };
        if let Err(err) = write_reply(&mut stdout, &reply).await {
            tracing::error!("stdout write failed: {}", err);
            return ExitCode::FAILURE;
        }
    }

    tracing::info!("stdin closed; exiting");
    ExitCode::SUCCESS
}
