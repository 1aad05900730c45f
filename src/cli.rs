use clap::Parser;

#[derive(Parser)]
#[command(
    version,
    about = "Convert proxy share links into clash, sing-box and v2ray configs",
    long_about = None
)]
pub struct Args {
    #[arg(
        help = "Share link (vmess://, vless://, trojan://, ss://, wg://)",
        required_unless_present = "list"
    )]
    pub uri: Option<String>,

    #[arg(
        short,
        long,
        default_value = "clash",
        help = "Output format: clash, singbox, v2ray, raw"
    )]
    pub format: String,

    #[arg(short, long, help = "Converter config, accept file path or URL")]
    pub config: Option<String>,

    #[arg(long, help = "Clash template, accept file path or URL (overrides config)")]
    pub clash_template: Option<String>,

    #[arg(long, help = "sing-box template, accept file path or URL (overrides config)")]
    pub singbox_template: Option<String>,

    #[arg(short, long, help = "Output file or directory, default stdout")]
    pub output: Option<String>,

    #[arg(short, long, help = "Emit debug log")]
    pub verbose: bool,

    #[arg(long, help = "List supported schemes and formats")]
    pub list: bool,
}
