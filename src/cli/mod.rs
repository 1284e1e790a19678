use std::io::{self, BufRead, Write};
use anyhow::{Context, Result};
use clap::Parser;
use crate::core::config::StoreConfig;
use crate::core::db::{Database, ErrorDisplayMode};
use crate::core::error::StoreError;
use crate::core::formatter::TableFormatter;
use crate::core::schema::{Table, DEFAULT_ID_FIELD};
use crate::core::storage::FlatRecordStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "公交出行数据的管理控制台", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: StoreConfig,
}

/// 控制台命令
#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Exit,
    List,
    Show(String),
    Json(String),
    Find { table: String, field: String, value: String },
    NextId(String),
    Delete { table: String, id: String },
    Backup(String),
    Mode,
}

impl Command {
    pub fn parse(input: &str) -> Result<Command, String> {
        let mut words = input.split_whitespace();
        let name = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();
        let table = |args: &[&str]| -> Result<String, String> {
            match args {
                [table] => Ok(table.to_string()),
                _ => Err(format!("用法: {} <table>", name)),
            }
        };
        match name {
            "help" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Exit),
            "list" => Ok(Command::List),
            "mode" => Ok(Command::Mode),
            "show" => table(&args).map(Command::Show),
            "json" => table(&args).map(Command::Json),
            "next-id" => table(&args).map(Command::NextId),
            "backup" => table(&args).map(Command::Backup),
            "find" => match args.as_slice() {
                // 值里可以有空格
                [table, field, value @ ..] if !value.is_empty() => Ok(Command::Find {
                    table: table.to_string(),
                    field: field.to_string(),
                    value: value.join(" "),
                }),
                _ => Err("用法: find <table> <field> <value>".to_string()),
            },
            "delete" => match args.as_slice() {
                [table, id] => Ok(Command::Delete {
                    table: table.to_string(),
                    id: id.to_string(),
                }),
                _ => Err("用法: delete <table> <id>".to_string()),
            },
            other => Err(format!("未知命令 {}，输入 help 查看帮助", other)),
        }
    }
}

impl Cli {
    pub fn run(&mut self) -> Result<()> {
        let db = Database::open(self.config.clone()).context("无法打开数据目录")?;
        let mut mode = ErrorDisplayMode::Brief;

        println!("Transit Store 管理控制台");
        println!("数据目录: {}", db.store().base_dir().display());
        println!("输入 'help' 获取帮助信息，'exit' 退出");

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("> ");
            io::stdout().flush()?;

            let Some(line) = lines.next() else { break };
            let input = line?;
            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            let command = match Command::parse(input) {
                Ok(command) => command,
                Err(usage) => {
                    println!("{}", usage);
                    continue;
                }
            };
            match command {
                Command::Exit => break,
                Command::Mode => {
                    mode = mode.toggle();
                    println!("错误显示模式: {:?}", mode);
                }
                command => {
                    if let Err(e) = execute(&db, command) {
                        println!("{}", mode.format(&e));
                    }
                }
            }
        }

        Ok(())
    }
}

fn execute(db: &Database, command: Command) -> Result<(), StoreError> {
    let store: &FlatRecordStore = db.store();
    match command {
        Command::Help => print_help(),
        Command::List => {
            println!("表列表:");
            for table in Table::ALL {
                let rows = store.read_all(table.name())?.len();
                println!("  {} ({} 行)", table, rows);
            }
        }
        Command::Show(table) => {
            let header = store.header(&table)?;
            let records = store.read_all(&table)?;
            print!("{}", TableFormatter::format_records(&header, &records));
            println!("共 {} 行", records.len());
        }
        Command::Json(table) => {
            for record in store.read_all(&table)? {
                let line = serde_json::to_string(&record)
                    .map_err(|e| StoreError::Validation(e.to_string()))?;
                println!("{}", line);
            }
        }
        Command::Find { table, field, value } => {
            let header = store.header(&table)?;
            let records = store.find_all(&table, &field, &value)?;
            print!("{}", TableFormatter::format_records(&header, &records));
        }
        Command::NextId(table) => println!("{}", store.next_id(&table, DEFAULT_ID_FIELD)?),
        Command::Delete { table, id } => {
            let removed = store.delete(&table, DEFAULT_ID_FIELD, &id)?;
            println!("已删除 {} 行", removed);
        }
        Command::Backup(table) => match store.backup(&table, &db.config().backup_dir)? {
            Some(path) => println!("已备份到 {}", path.display()),
            None => println!("表 {} 还没有数据文件", table),
        },
        Command::Exit | Command::Mode => {}
    }
    Ok(())
}

fn print_help() {
    println!("可用命令:");
    println!("  help                        - 显示帮助信息");
    println!("  exit                        - 退出程序");
    println!("  list                        - 列出所有表及行数");
    println!("  show <table>                - 以表格形式显示整张表");
    println!("  json <table>                - 每行一条 JSON 输出整张表");
    println!("  find <table> <field> <value> - 按列查找");
    println!("  next-id <table>             - 显示下一个可用ID");
    println!("  delete <table> <id>         - 按ID删除");
    println!("  backup <table>              - 备份表文件");
    println!("  mode                        - 切换简略/详细错误信息");
}
