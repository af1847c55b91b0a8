// Terabox Relay 命令行入口
//
// run 子命令跑完整的链接任务管线；其余子命令是管理员对用户记录的运维操作

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use terabox_relay_rust::access::parse_duration_spec;
use terabox_relay_rust::config::AppConfig;
use terabox_relay_rust::logging::init_logging;
use terabox_relay_rust::{
    AccessStore, HttpDownloader, LinkResolver, LocalTransport, PipelineController, Relay,
    ShareClient, Splitter, Transport,
};

#[derive(Parser)]
#[command(name = "terabox-relay", version, about = "Terabox 分享链接中转工具")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = AppConfig::DEFAULT_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 以指定用户身份执行一次分享链接任务
    Run {
        /// 请求者用户ID
        #[arg(long)]
        user: i64,
        /// 分享链接
        url: String,
    },
    /// 授予会员时长，时长形如 45m / 12h / 30d
    Grant { user: i64, duration: String },
    /// 撤销全部权限（封禁并清零配额与会员）
    Revoke { user: i64 },
    /// 封禁用户
    Ban { user: i64 },
    /// 解封用户
    Unban { user: i64 },
    /// 查看用户状态
    Status { user: i64 },
    /// 列出用户
    Users {
        /// 最多列出的条数
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config).await?;
    let _log_guard = init_logging(&config.log)?;

    let store = Arc::new(AccessStore::open(
        &config.access.database_path,
        config.access.admin_id,
        config.access.initial_credits,
    )?);

    match cli.command {
        Commands::Run { user, url } => run_job(&config, store, user, &url).await?,
        Commands::Grant { user, duration } => {
            let seconds = parse_duration_spec(&duration)
                .with_context(|| format!("无效的时长描述: {}", duration))?;
            let expiry = store.grant(user, seconds)?;
            println!("已授予用户 {} 会员，至 {}", user, format_timestamp(expiry));
        }
        Commands::Revoke { user } => {
            store.revoke(user)?;
            println!("已撤销用户 {} 的全部权限", user);
        }
        Commands::Ban { user } => {
            store.set_banned(user, true)?;
            println!("已封禁用户 {}", user);
        }
        Commands::Unban { user } => {
            store.set_banned(user, false)?;
            println!("已解封用户 {}", user);
        }
        Commands::Status { user } => match store.get(user)? {
            Some(record) => {
                let (_, tier) = store.evaluate(user)?;
                println!("用户: {}", record.id);
                println!("等级: {}", tier.label());
                println!("剩余配额: {}", record.credits);
                println!(
                    "会员到期: {}",
                    if record.expiry_date > 0 {
                        format_timestamp(record.expiry_date)
                    } else {
                        "无".to_string()
                    }
                );
                println!("封禁: {}", if record.is_banned { "是" } else { "否" });
            }
            None => println!("用户 {} 不存在", user),
        },
        Commands::Users { limit } => {
            let total = store.count_users()?;
            println!("用户总数: {}", total);
            for record in store.list_users(limit)? {
                println!(
                    "{}\tcredits={}\texpiry={}\tbanned={}",
                    record.id,
                    record.credits,
                    if record.expiry_date > 0 {
                        format_timestamp(record.expiry_date)
                    } else {
                        "-".to_string()
                    },
                    record.is_banned
                );
            }
        }
    }

    Ok(())
}

/// 组装管线并执行一次任务，Ctrl-C 转为取消信号
async fn run_job(config: &AppConfig, gate: Arc<AccessStore>, user: i64, url: &str) -> Result<()> {
    let source = ShareClient::new(&config.resolver)?;
    let resolver = LinkResolver::new(source, config.resolver.max_depth);
    let fetcher = Arc::new(HttpDownloader::new(
        &config.resolver.user_agent,
        &config.resolver.api_base,
        Duration::from_secs(config.download.progress_interval_secs),
    )?);
    let splitter = Splitter::new(config.split.clone()).with_chunk_size(config.download.chunk_size);
    let transport: Arc<dyn Transport> =
        Arc::new(LocalTransport::new(config.relay.output_dir.clone()));
    let relay = Relay::new(transport, config.relay.audit_chat_id);

    let controller = PipelineController::new(
        gate,
        resolver,
        fetcher,
        splitter,
        relay,
        config.download.download_dir.clone(),
    );

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到 Ctrl-C，取消当前任务");
            cancel_on_signal.cancel();
        }
    });

    let started = Instant::now();
    let outcome = controller
        .run(user, url, &cancel, &move |update| {
            println!("{}", update.render(started));
        })
        .await?;

    info!("任务结局: {:?}", outcome);
    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    match Local.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => secs.to_string(),
    }
}
