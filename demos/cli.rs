use anyhow::Result;
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use zerochat::{ClientNotification, MessageKind, ZeroChatClient, ZeroChatConfig};

const HELP: &str =
    "commands: scan | stop | list | connect <n|name> | send <text> | disconnect | quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zerochat=info")),
        )
        .init();

    // 1. --- Load Configuration ---
    // Optional: without a path every setting takes its default.
    let config = match env::args().nth(1) {
        Some(path) => {
            println!("Loading configuration from '{}'...", path);
            ZeroChatConfig::load(&path)?
        }
        None => ZeroChatConfig::default(),
    };

    // 2. --- Start the chat core ---
    let (notification_tx, mut notification_rx) = mpsc::channel(64);
    let zerochat = zerochat::start(config, notification_tx).await?;
    let client = zerochat.client();
    println!("{HELP}");

    // 3. --- Interleave user input and notifications ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !run_command(&client, line.trim()).await {
                    break;
                }
            }
            Some(notification) = notification_rx.recv() => print_notification(notification),
        }
    }

    zerochat.shutdown().await?;
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn run_command(client: &ZeroChatClient, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let result = match command {
        "" => Ok(()),
        "scan" => client.start_scan().await,
        "stop" => client.stop_scan().await,
        "list" => match client.snapshot().await {
            Ok(snapshot) => {
                for (i, service) in snapshot.services.iter().enumerate() {
                    let port = service.port.map(|p| p.to_string()).unwrap_or_default();
                    println!("  {i}: {} {:?}:{}", service.name, service.addresses, port);
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        "connect" => connect(client, rest.trim()).await,
        "send" => client.send(rest).await,
        "disconnect" => client.disconnect().await,
        "quit" | "exit" => return false,
        _ => {
            println!("{HELP}");
            Ok(())
        }
    };
    // Errors are also delivered as notifications and printed there.
    if let Err(e) = result {
        tracing::debug!("command '{}' failed: {}", command, e);
    }
    true
}

async fn connect(client: &ZeroChatClient, target: &str) -> zerochat::Result<()> {
    if let Ok(index) = target.parse::<usize>() {
        let snapshot = client.snapshot().await?;
        if let Some(service) = snapshot.services.get(index) {
            return client.connect(service.clone()).await;
        }
    }
    client.connect_by_name(target).await
}

fn print_notification(notification: ClientNotification) {
    match notification {
        ClientNotification::ScanStateChanged(state) => println!("[scan] {:?}", state),
        ClientNotification::ServiceDiscovered(service) => {
            println!("[scan] + {} {:?}", service.name, service.addresses)
        }
        ClientNotification::ServiceLost(name) => println!("[scan] - {}", name),
        ClientNotification::ServicesCleared => {}
        ClientNotification::ConnectionStateChanged {
            state,
            service_name,
        } => println!(
            "[session] {:?} {}",
            state,
            service_name.unwrap_or_default()
        ),
        ClientNotification::MessageAppended(message) => {
            let who = match message.kind {
                MessageKind::Sent => "me",
                MessageKind::Received => "peer",
                MessageKind::System => "--",
            };
            println!("{} {:>4} {}", message.timestamp, who, message.content);
        }
        ClientNotification::MessagesCleared => {}
        ClientNotification::Error(e) => eprintln!("[error] {}", e),
    }
}
