//! 指标端点服务器实现
//!
//! 在后台任务中提供 `/metrics` 拉取端点，与探测循环相互独立

use crate::error::{ConfigError, Result};
use crate::web::metrics::MetricsSink;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Prometheus文本格式的内容类型
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const INDEX_PAGE: &str = r#"<html>
<head><title>Probe Exporter</title></head>
<body>
<h1>Probe Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

/// 指标端点服务器
pub struct MetricsServer {
    /// 监听地址
    addr: SocketAddr,
    /// 指标接收器
    sink: Arc<MetricsSink>,
}

impl MetricsServer {
    /// 创建新的指标端点服务器
    ///
    /// # 参数
    /// * `bind_address` - 绑定地址
    /// * `port` - 监听端口
    /// * `sink` - 指标接收器
    pub fn new(bind_address: &str, port: u16, sink: Arc<MetricsSink>) -> Result<Self> {
        let addr = format!("{bind_address}:{port}")
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!("无效的监听地址 {bind_address}:{port}: {e}"))
            })?;

        Ok(Self { addr, sink })
    }

    /// 创建路由
    pub fn router(sink: Arc<MetricsSink>) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/metrics", get(metrics_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(sink)
    }

    /// 绑定端口并在后台任务中启动服务器
    ///
    /// 端口绑定失败会直接返回错误，便于启动阶段终止进程。
    ///
    /// # 返回
    /// * `Result<(SocketAddr, JoinHandle<()>)>` - 实际监听地址和服务器任务句柄
    pub async fn spawn(self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("指标端点已启动，监听地址: http://{}/metrics", local_addr);

        let router = Self::router(self.sink);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("指标端点服务器异常退出: {}", e);
            }
        });

        Ok((local_addr, handle))
    }
}

/// 首页处理函数
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// 指标处理函数
async fn metrics_handler(State(sink): State<Arc<MetricsSink>>) -> Response {
    match sink.gather_metrics() {
        Ok(metrics) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], metrics).into_response(),
        Err(e) => {
            error!("采集指标失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "采集指标失败").into_response()
        }
    }
}
