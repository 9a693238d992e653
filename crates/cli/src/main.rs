//! # sstable-shell
//!
//! A REPL over one table directory. Rows are appended to a table being
//! written; FLUSH finalizes and publishes it. Reads commands from stdin, so
//! it works both interactively and with piped scripts.
//!
//! ## Commands
//!
//! ```text
//! APPEND key value   Append a row to the table being written (keys ascending)
//! FLUSH              Finalize and publish the table being written
//! ABORT              Drop the table being written, leaving its temporary files
//! RECOVER            Finish every temporary table in the directory
//! TABLES             List published tables
//! SCAN generation    Print every row of a published table
//! STATS [generation] Print table estimates, or the shell state
//! EXIT / QUIT        Shut down (a table being written is flushed first)
//! ```
//!
//! ## Configuration
//!
//! ```text
//! SSTABLE_DIR          table directory, named after the keyspace (default: "data/ks")
//! SSTABLE_TABLE        column family name                         (default: "users")
//! SSTABLE_PARTITIONER  bytes | hash                               (default: "bytes")
//! SSTABLE_*            writer settings, see `Config::from_env`
//! ```

use anyhow::{Context, Result};
use cli::{partitioner_by_name, TableStore};
use config::Config;
use log::info;
use sstable::SSTableReader;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn print_table(reader: &SSTableReader) {
    println!(
        "{} keys={} data={}B index={}B summary={}",
        reader.descriptor(),
        reader.estimated_keys(),
        reader.data_file().length(),
        reader.index_file().length(),
        reader.summary().len()
    );
}

fn print_stats(reader: &SSTableReader) {
    print_table(reader);
    let rows = reader.estimated_row_size();
    let columns = reader.estimated_column_count();
    println!(
        "row size: count={} min={} max={} mean={}",
        rows.count(),
        rows.min(),
        rows.max(),
        rows.mean()
    );
    println!(
        "columns:  count={} min={} max={} mean={}",
        columns.count(),
        columns.min(),
        columns.max(),
        columns.mean()
    );
    println!("max data age: {}", reader.max_data_age());
}

fn parse_generation(arg: Option<&str>) -> Option<u64> {
    arg.and_then(|g| g.parse().ok())
}

fn main() -> Result<()> {
    log_init::init();

    let dir = env_or("SSTABLE_DIR", "data/ks");
    let table = env_or("SSTABLE_TABLE", "users");
    let partitioner = partitioner_by_name(&env_or("SSTABLE_PARTITIONER", "bytes"))?;
    let config = Config::from_env().context("reading SSTABLE_* settings")?;

    let mut store = TableStore::open(&dir, &table, partitioner, config)?;
    let recovered = store.recover()?;
    if !recovered.is_empty() {
        info!("recovered generations {:?}", recovered);
    }

    println!(
        "sstable-shell started (dir={}, table={}, tables={}, recovered={})",
        dir,
        table,
        store.tables().count(),
        recovered.len()
    );
    println!("Commands: APPEND key value | FLUSH | ABORT | RECOVER");
    println!("          TABLES | SCAN generation | STATS [generation] | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "APPEND" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: APPEND key value");
                        } else {
                            match store.append(k.as_bytes(), v.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR append failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: APPEND key value");
                    }
                }
                "FLUSH" => match store.flush() {
                    Ok(Some(reader)) => print_table(reader),
                    Ok(None) => println!("(nothing to flush)"),
                    Err(e) => println!("ERR flush failed: {:#}", e),
                },
                "ABORT" => match store.abort() {
                    Some(desc) => println!("aborted {}", desc),
                    None => println!("(nothing to abort)"),
                },
                "RECOVER" => match store.recover() {
                    Ok(generations) => println!("OK (recovered {:?})", generations),
                    Err(e) => println!("ERR recover failed: {:#}", e),
                },
                "TABLES" => {
                    let mut count = 0;
                    for reader in store.tables() {
                        print_table(reader);
                        count += 1;
                    }
                    println!("({} tables)", count);
                }
                "SCAN" => match parse_generation(parts.next()) {
                    Some(generation) => match store.scan(generation) {
                        Ok(rows) => {
                            if rows.is_empty() {
                                println!("(empty)");
                            } else {
                                for (k, v) in &rows {
                                    println!(
                                        "{} -> {}",
                                        String::from_utf8_lossy(k),
                                        String::from_utf8_lossy(v)
                                    );
                                }
                                println!("({} rows)", rows.len());
                            }
                        }
                        Err(e) => println!("ERR scan failed: {:#}", e),
                    },
                    None => println!("ERR usage: SCAN generation"),
                },
                "STATS" => match parse_generation(parts.next()) {
                    Some(generation) => match store.table(generation) {
                        Some(reader) => print_stats(reader),
                        None => println!("ERR no published table with generation {}", generation),
                    },
                    None => println!("{:?}", store),
                },
                "EXIT" | "QUIT" => {
                    if let Err(e) = store.flush() {
                        println!("ERR flush failed: {:#}", e);
                    }
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
