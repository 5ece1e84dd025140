use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "router", about = "Light/heavy dispatcher for the solving engine")]
pub struct Config {
    #[arg(long, env = "ROUTER_PORT", default_value_t = 8090)]
    pub router_port: u16,

    #[arg(long, env = "LIGHT_WORKER_URL", default_value = "http://127.0.0.1:8080")]
    pub light_worker_url: String,

    #[arg(long, env = "HEAVY_WORKER_URL", default_value = "http://127.0.0.1:8081")]
    pub heavy_worker_url: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
