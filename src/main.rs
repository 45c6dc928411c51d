//! bee-toolhub
//!
//! 入口：初始化日志、加载配置、组装 ToolHub，打印合并后的工具目录、提供者状态，
//! 以及（给出任务或计划文件时）协调计划；--watch 时保持后台健康检查直到 Ctrl+C。
//!
//! 用法：bee-toolhub [--config PATH] [--plan REQUEST.json] [--watch] [TASK...]

use std::path::PathBuf;

use anyhow::{bail, Context};
use bee_toolhub::{
    coordinator::{CoordinateRequest, ExecutionMode, SubtaskSpec},
    core::{create_hub_builder, run_with_graceful_shutdown, BrowserCleanup, ShutdownCoordinator, ShutdownManager},
    observability,
};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    plan: Option<PathBuf>,
    watch: bool,
    task: Vec<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(it.next().context("--config needs a path")?.into()),
            "--plan" => args.plan = Some(it.next().context("--plan needs a path")?.into()),
            "--watch" => args.watch = true,
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            _ => args.task.push(arg),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = parse_args()?;

    let mut hub = create_hub_builder(args.config.clone()).build();

    let tools = hub.registry.get_all_tools().await;
    let mut catalogue: Vec<serde_json::Value> = tools
        .values()
        .map(|d| {
            serde_json::json!({
                "name": d.name,
                "description": d.description,
                "source": d.source(),
            })
        })
        .collect();
    catalogue.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    let servers = hub.gateway.list_servers().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "tools": catalogue,
            "servers": servers,
        }))?
    );

    let request = match (&args.plan, args.task.is_empty()) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(serde_json::from_str::<CoordinateRequest>(&raw).context("Invalid coordinate request")?)
        }
        (None, false) => {
            let task = args.task.join(" ");
            Some(CoordinateRequest {
                subtasks: vec![SubtaskSpec::new(1, task.clone())],
                task,
                mode: ExecutionMode::Sequential,
            })
        }
        (None, true) => None,
    };
    if let Some(request) = request {
        let plan = hub.coordinator.coordinate_request(&request).await;
        println!("{}", serde_json::to_string_pretty(&plan)?);
    }

    let shutdown = ShutdownManager::new();
    let mut coordinator = ShutdownCoordinator::new(shutdown.clone());
    coordinator.register(BrowserCleanup::new(hub.browser.clone()));

    if args.watch {
        hub.start_background(shutdown.token());
        let waiter = shutdown.clone();
        run_with_graceful_shutdown(&coordinator, async move { waiter.wait_for_shutdown().await }).await;
    } else {
        coordinator.run_cleanup().await;
    }
    hub.shutdown().await;

    Ok(())
}
