use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "talkto-server", about = "TalkTo chat server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/talkto.toml")]
    pub config: String,

    /// Address to listen on (overrides config)
    #[arg(long)]
    pub bind: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}
