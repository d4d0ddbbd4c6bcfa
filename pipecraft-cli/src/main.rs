mod ops;

use clap::{Parser, Subcommand};
use ops::{attach_fifos, create_fifos, run_command, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Expose a process's stdio through named pipes and attach to them.
#[derive(Parser)]
#[command(
    name = "pipecraft",
    author,
    version,
    about = "Attach process stdio through named pipes"
)]
struct Cli {
    /// create/run 在其下建私有子目录（留空用系统临时目录）；attach 时为 fifo 所在目录
    #[arg(long, env = "PC_FIFO_DIR", global = true)]
    dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, env = "PC_OUTPUT", default_value = "table", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 创建 fifo 集合并保持到 Ctrl+C，退出时删除
    Create {
        id: String,
        /// 进程一侧按终端语义使用这些管道
        #[arg(long, default_value_t = false)]
        terminal: bool,
    },
    /// 把当前终端的 stdin/stdout/stderr 接到已存在的 fifo 上
    Attach { id: String },
    /// 启动命令，stdio 通过 fifo 转发到当前终端
    Run {
        /// fifo 名称前缀，默认 run-<pid>
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value_t = false)]
        terminal: bool,
        /// 要执行的命令及参数
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    // 加载 .env 文件（如果存在），忽略错误
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    // 终端 stdin 上的阻塞读无法中断，直接退出，不等运行时回收
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Create { id, terminal } => {
            create_fifos(cli.dir.as_deref(), &id, terminal, cli.output).await?;
            Ok(0)
        }
        Commands::Attach { id } => {
            let Some(dir) = cli.dir.as_deref() else {
                anyhow::bail!("attach 需要 --dir（或 PC_FIFO_DIR）指向 fifo 所在目录");
            };
            attach_fifos(dir, &id).await?;
            Ok(0)
        }
        Commands::Run {
            id,
            terminal,
            command,
        } => {
            let id = id.unwrap_or_else(|| format!("run-{}", std::process::id()));
            run_command(cli.dir.as_deref(), &id, terminal, &command).await
        }
    }
}

fn init_tracing() {
    // 日志写 stderr，避免与转发的 stdout 混在一起
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses() {
        let args = ["pipecraft", "create", "svc"];
        let _ = Cli::parse_from(&args);
    }

    #[test]
    fn run_keeps_command_args() {
        let cli = Cli::parse_from(["pipecraft", "--dir", "/tmp/pc", "run", "--", "ls", "-la"]);
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/pc")));
        match cli.command {
            Commands::Run { id, command, .. } => {
                assert!(id.is_none());
                assert_eq!(command, vec!["ls", "-la"]);
            }
            _ => panic!("expected run"),
        }
    }
}
