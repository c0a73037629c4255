use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use speakcoach::analysis::client::AnalyzerClient;
use speakcoach::audio::source::{mime_for_file_name, SelectedFile};
use speakcoach::config::Config;
use speakcoach::effects::{
    DeviceEffectRunner, EffectRunner, SimulatedEffectRunner, SimulationScript,
};
use speakcoach::state_machine::Event;
use speakcoach::{spawn_workflow, ViewState};

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let runner: Arc<dyn EffectRunner> = match &config.analyzer_url {
        Some(url) => {
            log::info!("Using analyzer at {}", url);
            DeviceEffectRunner::new(AnalyzerClient::new(url.clone(), config.analyzer_timeout))
        }
        None => {
            log::info!("ANALYZER_URL not set, using simulated analyzer");
            SimulatedEffectRunner::new(SimulationScript::demo())
        }
    };

    let handle = spawn_workflow(runner);

    // Print every view snapshot as one JSON line.
    let mut view = handle.view();
    tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let snapshot: ViewState = view.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("Failed to serialize view: {}", e),
            }
        }
    });

    println!("Commands: record, stop, file <path>, submit, reset, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let (command, argument) = match line.split_once(' ') {
            Some((c, a)) => (c, Some(a.trim())),
            None => (line, None),
        };

        let sent = match command {
            "" => Ok(()),
            "record" => handle.start_recording().await,
            "stop" => handle.stop_recording().await,
            "file" => {
                let Some(path) = argument else {
                    eprintln!("usage: file <path>");
                    continue;
                };
                match tokio::fs::read(path).await {
                    Ok(bytes) => {
                        let name = std::path::Path::new(path)
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| path.to_string());
                        log::info!(
                            "Selected file '{}' ({} bytes, {})",
                            name,
                            bytes.len(),
                            mime_for_file_name(&name)
                        );
                        handle.choose_file(Some(SelectedFile { name, bytes })).await
                    }
                    Err(e) => {
                        eprintln!("Could not read {}: {}", path, e);
                        continue;
                    }
                }
            }
            "submit" => handle.submit().await,
            "reset" => handle.reset().await,
            "quit" | "exit" => {
                let _ = handle.send(Event::Exit).await;
                break;
            }
            other => {
                eprintln!("Unknown command: {}", other);
                continue;
            }
        };

        if sent.is_err() {
            log::error!("Workflow loop is gone, exiting");
            break;
        }
    }
}
