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
#[command(name = "fo-search", about = "Substring search over the wrapped view of a file (demo)")]
struct Args {
    /// File to search
    file: std::path::PathBuf,
    /// Literal query, at least 3 bytes
    query: String,
    /// Terminal width in bytes
    #[arg(long, default_value_t = 80)]
    width: u32,
    /// Block size for the streaming reader
    #[arg(long, default_value_t = 1024)]
    block_size: usize,
    /// Overlap window; supports queries up to this plus one byte
    #[arg(long, default_value_t = 9)]
    index_next_bytes: usize,
    /// Emit results as NDJSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    if args.query.len() > args.index_next_bytes + 1 {
        eprintln!(
            "note: query is longer than {} bytes; block-straddling matches may be missed",
            args.index_next_bytes + 1
        );
    }

    let (mut driver, mut events) =
        folio::file_driver(&args.file, args.block_size, args.index_next_bytes, b"\n".to_vec())?;
    driver.run()?;
    driver.resize_window(args.width).await?;

    // Let the whole file wrap before searching: the total stops moving once
    // the reader hits end of input. Demo-grade synchronization.
    let mut last_total = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let total = driver.total_lines();
        if total > 0 && total == last_total {
            break;
        }
        last_total = total;
    }

    driver.search(&args.query).await?;
    while let Some(event) = events.recv().await {
        let Event::Search(status) = event else { continue };
        if !status.complete {
            continue;
        }
        if args.json {
            for result in &status.results {
                println!("{}", serde_json::to_string(result)?);
            }
        } else {
            println!("{} match(es) for {:?}", status.results.len(), status.query);
            for result in &status.results {
                println!("  {}", result);
            }
        }
        break;
    }

    driver.stop().await;
    Ok(())
}
