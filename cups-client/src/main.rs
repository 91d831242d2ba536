use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cups_client::session::{RetryPolicy, SessionController};
use cups_client::view;
use protocol::ServerMessage;

#[tokio::main]
async fn main() -> Result<()> {
    // 日志走 stderr，避免和界面输出混在一起
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cups_client=info".parse()?),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| protocol::NetworkConfig::default().addr());
    let username = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "player1".to_string());

    let (session, mut events) = SessionController::connect(&addr, RetryPolicy::default()).await?;
    println!("Connected to {}", addr);
    session.join(&username).await?;

    // 后台打印入站事件
    let printer_session = session.clone();
    let printer = tokio::spawn(async move {
        while let Some(msg) = events.recv().await {
            match msg {
                ServerMessage::JoinAck { message, .. } => println!("{}", message),
                ServerMessage::Message { text } => println!("* {}", text),
                ServerMessage::Error { code, message } => println!("! {}: {}", code, message),
                ServerMessage::GameState { state } => {
                    println!("{}", view::render(&state, printer_session.player_id()));
                }
                ServerMessage::QuitAck { message } => {
                    println!("{}", message);
                    break;
                }
            }
        }
    });

    // 前台命令循环
    println!("Commands: hide N | guess N | move N | chat TEXT | state | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        let result = match cmd {
            "" => Ok(()),
            "hide" => match rest.parse::<u8>() {
                Ok(position) => session.hide(position).await,
                Err(_) => {
                    println!("usage: hide N");
                    Ok(())
                }
            },
            "guess" => match rest.parse::<u8>() {
                Ok(position) => session.guess(position).await,
                Err(_) => {
                    println!("usage: guess N");
                    Ok(())
                }
            },
            "move" => match rest.parse::<u8>() {
                Ok(position) => session.make_move(position).await,
                Err(_) => {
                    println!("usage: move N");
                    Ok(())
                }
            },
            "chat" => session.chat(rest).await,
            "state" => {
                match session.latest_state() {
                    Some(state) => println!("{}", view::render(&state, session.player_id())),
                    None => println!("No state received yet"),
                }
                Ok(())
            }
            "quit" => {
                let _ = session.quit().await;
                break;
            }
            _ => {
                println!("Unknown command: {}", cmd);
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("! {}", e);
        }
    }

    let _ = printer.await;
    Ok(())
}
