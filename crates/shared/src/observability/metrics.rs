//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
///
/// drop 时终止指标 HTTP 服务器。
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
    local_addr: SocketAddr,
}

impl MetricsHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_lock_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    start_metrics_server(addr, handle).await
}

/// 注册锁相关指标的描述
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中
pub fn register_lock_metrics(service_name: &str) {
    metrics::describe_counter!(
        "pals_lock_acquire_total",
        "Total number of lock acquisition attempts by outcome"
    );
    metrics::describe_histogram!(
        "pals_lock_acquire_wait_seconds",
        "Time spent polling the backing store for a lock"
    );
    metrics::describe_counter!("pals_lock_release_total", "Total number of lock releases");
    metrics::describe_counter!(
        "pals_lock_abandoned_total",
        "Locks dropped while still held and released by the safety net"
    );
    metrics::describe_histogram!(
        "pals_session_wait_seconds",
        "Time spent waiting for a pooled session"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(addr: SocketAddr, handle: PrometheusHandle) -> Result<MetricsHandle> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Metrics server listening on {}", local_addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(MetricsHandle {
        server_handle,
        local_addr,
    })
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次获取尝试
///
/// `outcome` 取值：acquired / rejected / timeout / error
#[inline]
pub fn record_lock_acquire(namespace: &str, mode: &str, outcome: &str, wait_secs: f64) {
    metrics::counter!(
        "pals_lock_acquire_total",
        "namespace" => namespace.to_string(),
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "pals_lock_acquire_wait_seconds",
        "namespace" => namespace.to_string(),
        "mode" => mode.to_string()
    )
    .record(wait_secs);
}

/// 记录释放
#[inline]
pub fn record_lock_release(namespace: &str, mode: &str, outcome: &str) {
    metrics::counter!(
        "pals_lock_release_total",
        "namespace" => namespace.to_string(),
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录被遗弃的锁
#[inline]
pub fn record_lock_abandoned(namespace: &str) {
    metrics::counter!(
        "pals_lock_abandoned_total",
        "namespace" => namespace.to_string()
    )
    .increment(1);
}

/// 记录等待会话的时间
#[inline]
pub fn record_session_wait(wait_secs: f64) {
    metrics::histogram!("pals_session_wait_seconds").record(wait_secs);
}
