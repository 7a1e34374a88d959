//! 3E 帧 TCP 客户端
//!
//! 所有读取共用一条 TCP 连接，由互斥锁串行化：同一时刻只有一个请求在途。
//! 连接在首次读取时建立；任何 I/O 错误都会关闭并清空连接，下一次读取重新拨号。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let client = McClient::connect(McClientConfig::new("192.168.3.39", 5011)).await?;
//! let frame = client.read("D", 100, 1).await?;
//! let value = decode(&frame, 1)?;
//! ```

use crate::error::ProtocolError;
use crate::frame::{
    END_CODE_LEN, ERROR_INFO_LEN, FrameError, RESPONSE_PREFIX_LEN, ResponseFrame, Station,
    build_read_request, response_data_len,
};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 寄存器读取抽象（轮询流水线依赖此接口）。
#[async_trait]
pub trait RegisterReader: Send + Sync {
    /// 读取 `count` 个字，返回完整响应帧（含响应头）。
    async fn read(&self, tag: &str, offset: i64, count: i64) -> Result<Vec<u8>, ProtocolError>;
}

/// 客户端配置
#[derive(Debug, Clone)]
pub struct McClientConfig {
    /// PLC 主机地址
    pub host: String,
    /// PLC 端口
    pub port: u16,
    /// 建连/读/写超时
    pub io_timeout: Duration,
    /// 监视定时器（单位 250ms）
    pub monitoring_timer: u16,
    /// 访问路径
    pub station: Station,
}

impl McClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            io_timeout: Duration::from_secs(5),
            monitoring_timer: 0x0010,
            station: Station::local(),
        }
    }
}

/// 3E 帧客户端（共享单连接）
pub struct McClient {
    addr: SocketAddr,
    config: McClientConfig,
    conn: Mutex<Option<TcpStream>>,
}

impl McClient {
    /// 解析 PLC 地址并返回客户端；此时不建立 TCP 连接。
    pub async fn connect(config: McClientConfig) -> Result<Self, ProtocolError> {
        let target = format!("{}:{}", config.host, config.port);
        let addr = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| ProtocolError::Connection(format!("resolve {}: {}", target, e)))?
            .next()
            .ok_or_else(|| ProtocolError::Connection(format!("resolve {}: no address", target)))?;
        info!(target: "plcgw.protocol", %addr, "plc_client_ready");
        Ok(Self {
            addr,
            config,
            conn: Mutex::new(None),
        })
    }

    /// PLC 地址
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 批量读取 `count` 个字。
    pub async fn read(&self, tag: &str, offset: i64, count: i64) -> Result<Vec<u8>, ProtocolError> {
        let request = build_read_request(
            &self.config.station,
            self.config.monitoring_timer,
            tag,
            offset,
            count,
        )?;

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(ProtocolError::Connection(format!("{}: not connected", self.addr)));
        };

        match self.exchange(stream, &request, count).await {
            Ok(frame) => {
                debug!(
                    target: "plcgw.protocol",
                    device = %tag,
                    offset,
                    count,
                    len = frame.len(),
                    "plc_response_received"
                );
                let end_code = ResponseFrame::parse(&frame)?.end_code;
                if end_code != 0 {
                    return Err(ProtocolError::EndCode(end_code));
                }
                Ok(frame)
            }
            Err(err) => {
                if err.resets_connection() {
                    warn!(target: "plcgw.protocol", addr = %self.addr, error = %err, "plc_connection_reset");
                    if let Some(mut stream) = guard.take() {
                        let _ = stream.shutdown().await;
                    }
                }
                Err(err)
            }
        }
    }

    /// 关闭连接（若已建立）。
    pub async fn close(&self) -> Result<(), ProtocolError> {
        let mut guard = self.conn.lock().await;
        if let Some(mut stream) = guard.take() {
            stream.shutdown().await?;
            info!(target: "plcgw.protocol", addr = %self.addr, "plc_connection_closed");
        }
        Ok(())
    }

    async fn dial(&self) -> Result<TcpStream, ProtocolError> {
        let stream = self
            .with_timeout("connect", TcpStream::connect(self.addr))
            .await?
            .map_err(|e| ProtocolError::Connection(format!("{}: {}", self.addr, e)))?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(target: "plcgw.protocol", addr = %self.addr, error = %err, "plc_nodelay_failed");
        }
        info!(target: "plcgw.protocol", addr = %self.addr, "plc_connected");
        Ok(stream)
    }

    async fn exchange(
        &self,
        stream: &mut TcpStream,
        request: &[u8],
        count: i64,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.with_timeout("write", stream.write_all(request)).await??;

        let mut frame = vec![0u8; RESPONSE_PREFIX_LEN];
        self.with_timeout("read header", stream.read_exact(&mut frame))
            .await??;
        let data_len = response_data_len(&frame)?;
        let max_len = END_CODE_LEN + (2 * count as usize).max(ERROR_INFO_LEN);
        if !(END_CODE_LEN..=max_len).contains(&data_len) {
            return Err(FrameError::DataLengthOutOfRange(data_len).into());
        }

        frame.resize(RESPONSE_PREFIX_LEN + data_len, 0);
        self.with_timeout("read body", stream.read_exact(&mut frame[RESPONSE_PREFIX_LEN..]))
            .await??;
        Ok(frame)
    }

    async fn with_timeout<F, T>(&self, stage: &str, fut: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.config.io_timeout, fut)
            .await
            .map_err(|_| ProtocolError::Timeout(format!("{} {}", stage, self.addr)))
    }
}

#[async_trait]
impl RegisterReader for McClient {
    async fn read(&self, tag: &str, offset: i64, count: i64) -> Result<Vec<u8>, ProtocolError> {
        McClient::read(self, tag, offset, count).await
    }
}
