use clap::ValueEnum;
use pipecraft_core::Config;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

/// 打印 fifo 路径，供另一侧的启动器绑定。
pub fn print_config(config: &Config, output: OutputFormat) -> anyhow::Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Table => println!("{}", render_table(config)),
    }
    Ok(())
}

fn render_table(config: &Config) -> String {
    format!(
        "stdin     {}\nstdout    {}\nstderr    {}\nterminal  {}",
        config.stdin.display(),
        config.stdout.display(),
        config.stderr.display(),
        config.terminal
    )
}
