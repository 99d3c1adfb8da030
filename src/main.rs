/*
 * Upload Gateway - Image Upload Service
 * Copyright (c) 2024 Upload Gateway Contributors
 *
 * This work is licensed under CC BY-NC-SA 4.0
 * https://creativecommons.org/licenses/by-nc-sa/4.0/
 */

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload_gateway::{
    config::Config,
    handlers::AppState,
    routes::create_app,
    storage::{UrlSigner, build_storage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 文件可选
    let _ = dotenvy::dotenv();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upload_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置，缺少必填项时直接退出
    let config = Config::load().context("加载配置失败")?;
    tracing::info!(
        "服务器配置: {} (存储后端: {}, 单文件上限: {} MB)",
        config.server_addr(),
        config.storage.backend,
        config.upload.max_size_mb
    );

    // 初始化存储后端
    let storage = build_storage(&config)
        .await
        .context("初始化存储后端失败")?;
    let signer = Arc::new(UrlSigner::from_config(&config));

    // 创建应用状态和路由
    let app_state = AppState::new(Arc::new(config.clone()), storage, signer);
    let app = create_app(app_state);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(&config.server_addr())
        .await
        .with_context(|| format!("绑定地址失败: {}", config.server_addr()))?;
    tracing::info!("🚀 服务器启动成功，监听地址: {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("监听 Ctrl-C 失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("收到停止信号，正在关闭服务器");
}
