//! # CLI - Key-Weaving Interactive Shell
//!
//! A REPL-style command-line interface for the key-weaving storage engine.
//! Reads commands from stdin, executes them against a [`engine::Collection`],
//! and prints results to stdout. Designed for both interactive use and
//! scripted testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value dkey   Insert or update a key-value pair under delete key dkey
//! GET key              Look up a key (prints value or "(nil)")
//! DEL key              Delete a key (writes a tombstone with an empty delete key)
//! RANGEDEL low high    Drop every entry whose delete key falls in [low, high]
//! STATS                Print collection debug info
//! EXIT / QUIT          Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! KIWI_DIR               Data directory                (default: "data/kiwi")
//! KIWI_MEM_TABLE_KB       Memtable size limit in KiB    (default: 4096 = 4 MiB)
//! KIWI_LEVEL_SIZE_RATIO   Per-level size multiplier     (default: 10)
//! KIWI_DELETE_TTL_SECS    Delete-persistence threshold  (default: 86400 = 24h)
//! KIWI_NUM_LEVELS         Levels including memtable      (default: 6)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! collection opened (dir=data/kiwi, levels=6)
//! > SET name Alice name
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use config::CollectionOptions;
use engine::Collection;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn options_from_env() -> CollectionOptions {
    let dir_path = env_or("KIWI_DIR", "data/kiwi").into();
    let mem_table_size_limit: usize =
        env_or("KIWI_MEM_TABLE_KB", "4096").parse::<usize>().unwrap_or(4096) * 1024;
    let level_size_ratio: usize = env_or("KIWI_LEVEL_SIZE_RATIO", "10").parse().unwrap_or(10);
    let delete_persist_threshold =
        Duration::from_secs(env_or("KIWI_DELETE_TTL_SECS", "86400").parse().unwrap_or(86400));
    let num_initial_levels: usize = env_or("KIWI_NUM_LEVELS", "6").parse().unwrap_or(6);

    CollectionOptions {
        dir_path,
        mem_table_size_limit,
        level_size_ratio,
        delete_persist_threshold,
        num_initial_levels,
        ..CollectionOptions::default()
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let options = options_from_env();
    let dir_path = options.dir_path.display().to_string();
    let num_levels_reported = options.num_initial_levels;
    let col = Collection::open(options)?;

    println!("collection opened (dir={dir_path}, levels={num_levels_reported})");
    println!("Commands: SET key value dkey | GET key | DEL key | RANGEDEL low high");
    println!("          STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => match (parts.next(), parts.next(), parts.next()) {
                    (Some(k), Some(v), Some(dk)) => {
                        match col.put(k.as_bytes().to_vec(), v.as_bytes().to_vec(), dk.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR set failed: {e}"),
                        }
                    }
                    _ => println!("ERR usage: SET key value dkey"),
                },
                "GET" => {
                    if let Some(k) = parts.next() {
                        match col.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => match parts.next() {
                    Some(k) => match col.delete(k.as_bytes().to_vec()) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR del failed: {e}"),
                    },
                    None => println!("ERR usage: DEL key"),
                },
                "RANGEDEL" => match (parts.next(), parts.next()) {
                    (Some(low), Some(high)) => {
                        match col.range_delete(low.as_bytes().to_vec(), high.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR rangedel failed: {e}"),
                        }
                    }
                    _ => println!("ERR usage: RANGEDEL low high"),
                },
                "STATS" => {
                    println!("{col:?}");
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {other}");
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    col.close()?;
    Ok(())
}
