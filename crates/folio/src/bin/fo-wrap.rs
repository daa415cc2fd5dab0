// Copyright 2025 Folio Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::Parser;
use folio::Event;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fo-wrap", about = "Print a file as width-wrapped display lines (demo)")]
struct Args {
    /// File to wrap
    file: std::path::PathBuf,
    /// Terminal width in bytes
    #[arg(long, default_value_t = 80)]
    width: u32,
    /// Block size for the streaming reader
    #[arg(long, default_value_t = 1024)]
    block_size: usize,
    /// Overlap window; supports queries up to this plus one byte
    #[arg(long, default_value_t = 9)]
    index_next_bytes: usize,
    /// Print line numbers
    #[arg(long)]
    numbers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let (mut driver, mut events) =
        folio::file_driver(&args.file, args.block_size, args.index_next_bytes, b"\n".to_vec())?;
    driver.run()?;
    driver.resize_window(args.width).await?;
    driver.watch_lines(0, u32::MAX).await?;

    // Demo heuristic: the stream is done when the event flow goes quiet and
    // every wrapped line has been delivered.
    let mut received: u64 = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(250), events.recv()).await {
            Ok(Some(Event::Line { number, bytes })) => {
                received += 1;
                let text = String::from_utf8_lossy(&bytes);
                let line = text.strip_suffix('\n').unwrap_or(&*text);
                if args.numbers {
                    println!("{:>6} {}", number, line);
                } else {
                    println!("{}", line);
                }
            }
            Ok(Some(Event::Search(_))) => {}
            Ok(None) => break,
            Err(_) => {
                let total = driver.total_lines();
                if total > 0 && received >= total {
                    break;
                }
            }
        }
    }

    driver.stop().await;
    Ok(())
}
