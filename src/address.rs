//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 客户端地址解析
//!
//! 按配置的 [`ClientType`] 从请求中取出客户端地址。地址对核心逻辑是不透明
//! 的字符串，只作为账本的键使用，因此不做格式校验。

use crate::config::ClientType;
use crate::constants::PROXY_ADDRESS_HEADER;
use ahash::AHashMap as HashMap;
use tracing::debug;

/// 客户端请求
///
/// 只包含解析地址所需的信息。
#[derive(Clone, Default)]
pub struct ClientRequest {
    /// 连接的远端地址
    pub remote_addr: Option<String>,
    /// HTTP头（键为小写）
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for ClientRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 脱敏 headers
        let headers: HashMap<&str, &str> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let v = if k.contains("auth") || k.contains("cookie") {
                    "***"
                } else {
                    v.as_str()
                };
                (k.as_str(), v)
            })
            .collect();

        f.debug_struct("ClientRequest")
            .field("remote_addr", &self.remote_addr)
            .field("headers", &headers)
            .finish()
    }
}

impl ClientRequest {
    /// 创建空请求
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置远端地址
    pub fn with_remote_addr(mut self, addr: &str) -> Self {
        self.remote_addr = Some(addr.to_string());
        self
    }

    /// 添加HTTP头
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_lowercase(), value.to_string());
        self
    }

    /// 获取HTTP头（不区分大小写）
    pub fn get_header(&self, key: &str) -> Option<&String> {
        self.headers.get(&key.to_lowercase())
    }
}

/// 客户端地址解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver {
    client_type: ClientType,
}

impl AddressResolver {
    pub fn new(client_type: ClientType) -> Self {
        Self { client_type }
    }

    pub fn client_type(&self) -> ClientType {
        self.client_type
    }

    /// 按配置解析客户端地址
    ///
    /// 代理模式下缺少代理头时回退到远端地址。两者都没有时返回空字符串。
    ///
    /// 回退只是为了在误配置时仍能工作：直连时客户端可以自己伪造
    /// X-Forwarded-For，此时被锁定的地址由客户端决定。
    pub fn resolve(&self, request: &ClientRequest) -> String {
        if let Some(addr) = self.resolve_as(request, self.client_type) {
            return addr;
        }

        if self.client_type == ClientType::Proxy {
            if let Some(addr) = self.resolve_as(request, ClientType::Direct) {
                debug!("Proxy header missing, falling back to remote address");
                return addr;
            }
        }

        String::new()
    }

    /// 按指定来源解析，不做回退
    pub fn resolve_as(&self, request: &ClientRequest, client_type: ClientType) -> Option<String> {
        match client_type {
            ClientType::Direct => request
                .remote_addr
                .as_deref()
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(str::to_string),
            ClientType::Proxy => request
                .get_header(PROXY_ADDRESS_HEADER)
                .and_then(|value| parse_forwarded(value)),
        }
    }

    /// 根据请求是否带代理头猜测部署方式
    pub fn guess_client_type(request: &ClientRequest) -> ClientType {
        if request.get_header(PROXY_ADDRESS_HEADER).is_some() {
            ClientType::Proxy
        } else {
            ClientType::Direct
        }
    }
}

/// 解析 X-Forwarded-For（client, proxy1, proxy2），取最左边的地址
fn parse_forwarded(value: &str) -> Option<String> {
    value
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
