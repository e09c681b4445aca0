//! Terminal operator: prompts on stdout, answers from stdin

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;
use zeroize::Zeroizing;

use tumbler_core::{CancellationToken, CeremonyError, Operator, Result};

/// Operator at an interactive terminal.
///
/// Stdin is read on a dedicated thread so a pending read never holds up
/// shutdown.
pub struct TerminalOperator {
    input: Mutex<mpsc::Receiver<Zeroizing<String>>>,
    progress_active: AtomicBool,
    cancel: CancellationToken,
}

impl TerminalOperator {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            input: Mutex::new(spawn_stdin_reader()),
            progress_active: AtomicBool::new(false),
            cancel,
        }
    }

    /// Move off an in-place progress line before printing anything else
    fn end_progress(&self) {
        if self.progress_active.swap(false, Ordering::SeqCst) {
            println!();
        }
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<Zeroizing<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(Zeroizing::new(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn read_line(&self, label: &str) -> Result<Zeroizing<String>> {
        self.end_progress();
        print!("➡️  {}: ", label);
        let _ = io::stdout().flush();

        let mut input = self.input.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => {
                println!();
                Err(CeremonyError::Cancelled)
            }
            line = input.recv() => line.ok_or(CeremonyError::InputClosed),
        }
    }

    fn say(&self, message: &str) {
        self.end_progress();
        println!("{}", message);
    }

    fn progress(&self, line: &str) {
        print!("\r\x1b[K{}", line);
        let _ = io::stdout().flush();
        self.progress_active.store(true, Ordering::SeqCst);
    }

    fn progress_done(&self, line: &str) {
        println!("\r\x1b[K{}", line);
        self.progress_active.store(false, Ordering::SeqCst);
    }
}
