//! loyalty-server/src/console.rs
//!
//! A stdin stand-in for a chat connection. Each line is `<user> !command [args]`;
//! anyone who typed a line counts as present in chat.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use loyalty_common::traits::ChatPresence;
use loyalty_core::services::{handle_loyalty_command, ChatUser};
use loyalty_core::tasks::ActivityTracker;
use loyalty_core::{Error, LoyaltyManager};

pub struct ConsolePresence {
    online: bool,
    chatters: Mutex<BTreeSet<String>>,
}

impl ConsolePresence {
    pub fn new(online: bool) -> Self {
        Self { online, chatters: Mutex::new(BTreeSet::new()) }
    }

    pub async fn join(&self, user: &str) {
        self.chatters.lock().await.insert(user.to_lowercase());
    }
}

#[async_trait]
impl ChatPresence for ConsolePresence {
    async fn is_stream_online(&self) -> Result<bool, Error> {
        Ok(self.online)
    }

    async fn list_chatters(&self) -> Result<Vec<String>, Error> {
        Ok(self.chatters.lock().await.iter().cloned().collect())
    }
}

/// Splits `<user> !command rest...`. Lines without a `!command` are chat.
fn parse_line(line: &str) -> Option<(&str, Option<(&str, &str)>)> {
    let line = line.trim();
    let (user, rest) = match line.split_once(char::is_whitespace) {
        Some((user, rest)) => (user, rest.trim_start()),
        None if !line.is_empty() => (line, ""),
        None => return None,
    };
    let command = rest.strip_prefix('!').map(|cmd| match cmd.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim_start()),
        None => (cmd, ""),
    });
    Some((user, command))
}

pub async fn run_console(
    engine: Arc<LoyaltyManager>,
    presence: Arc<ConsolePresence>,
    activity: Arc<ActivityTracker>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Console ready. Type `<user> !balance`, `<user> !redeem <id>`, ...");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            biased;
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            },
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading console input: {:?}", e);
                        break;
                    }
                };
                let Some((user, command)) = parse_line(&line) else { continue };
                presence.join(user).await;
                activity.mark_active(user);

                let Some((name, args)) = command else { continue };
                let chat_user = ChatUser { name: user.to_lowercase(), display_name: user.to_string() };
                match handle_loyalty_command(&engine, name, &chat_user, args).await {
                    Ok(Some(reply)) => println!("{reply}"),
                    Ok(None) => {}
                    Err(e) if e.is_domain() => warn!("command !{} refused: {}", name, e),
                    Err(e) => error!("command !{} failed: {:?}", name, e),
                }
            }
        }
    }
    info!("Console closed.");
}
