mod demo;

use anyhow::Result;
use clap::Parser;
use common::pretty::{render_record_batch, TableStyleKind};
use common::Config;
use database::{Database, Output};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quarrydb", about = "Single-process SQL engine console")]
struct Args {
    /// Directory holding the paged heap, metadata, and index snapshots
    #[arg(long, default_value = "./quarry_data")]
    data_dir: PathBuf,
    /// Number of frames the buffer pool keeps resident
    #[arg(long, default_value_t = 128)]
    buffer_frames: usize,
    /// Execute the provided SQL and exit instead of starting the REPL
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,
    /// Run the scripted demo scenarios and exit
    #[arg(long)]
    demo: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .data_dir(args.data_dir)
        .buffer_pool_frames(args.buffer_frames)
        .build();
    let mut db = Database::open(config)?;

    if args.demo {
        demo::run(&mut db)?;
    } else if let Some(sql) = args.execute {
        execute_and_print(&mut db, &sql);
    } else {
        repl(&mut db)?;
    }

    db.persist()?;
    Ok(())
}

/// One SQL statement per line; `exit` ends the loop.
fn repl(db: &mut Database) -> Result<()> {
    println!("quarrydb console. One SQL statement per line; 'exit' quits.");
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("sql> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }
                let _ = editor.add_history_entry(&line);
                execute_and_print(db, &line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn execute_and_print(db: &mut Database, sql: &str) {
    match db.execute(sql) {
        Ok(outputs) => {
            for output in outputs {
                match output {
                    Output::Rows(batch) => {
                        println!("{}", render_record_batch(&batch, TableStyleKind::Ascii));
                        println!("{} row(s)", batch.rows.len());
                    }
                    Output::Affected(count) => println!("{count} row(s) affected."),
                    Output::Ddl(message) => println!("{message}"),
                }
            }
        }
        Err(err) => println!("error: {err}"),
    }
}
