//! 服务实现契约
//!
//! 所有服务实现统一为 `(方法名, 有序参数) -> 结果` 的调用契约，
//! [`ServiceRouter`] 用具名异步处理函数拼装出一个实现。

use crate::error::RpcError;
use crate::value::Value;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// 服务实现返回的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    pub fn failed(message: impl Into<String>) -> Self {
        ServiceError::Failed(message.into())
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Failed(format!("{:#}", err))
    }
}

impl From<RpcError> for ServiceError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Serialization(reason) => ServiceError::InvalidArguments(reason),
            other => ServiceError::Failed(other.to_string()),
        }
    }
}

/// 服务实现 trait
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// 调用方法
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, ServiceError>;
}

/// 读取第 `index` 个位置参数并转换为目标类型
pub fn arg<T>(args: &[Value], index: usize) -> Result<T, ServiceError>
where
    T: TryFrom<Value, Error = RpcError>,
{
    let value = args.get(index).cloned().ok_or_else(|| {
        ServiceError::InvalidArguments(format!(
            "missing argument #{} (got {})",
            index,
            args.len()
        ))
    })?;
    T::try_from(value)
        .map_err(|e| ServiceError::InvalidArguments(format!("argument #{}: {}", index, e)))
}

type Handler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, ServiceError>> + Send + Sync>;

/// 基于方法表的服务实现
#[derive(Default, Clone)]
pub struct ServiceRouter {
    handlers: HashMap<String, Handler>,
}

impl ServiceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册方法处理函数，同名方法后注册的覆盖先注册的
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |args: Vec<Value>| -> BoxFuture<'static, Result<Value, ServiceError>> {
                Box::pin(handler(args))
            });
        self.handlers.insert(name.into(), handler);
        self
    }

    /// 已注册的方法名（排序）
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRouter")
            .field("methods", &self.methods())
            .finish()
    }
}

#[async_trait]
impl RpcService for ServiceRouter {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, ServiceError> {
        let handler = self
            .handlers
            .get(method)
            .cloned()
            .ok_or_else(|| ServiceError::MethodNotFound(method.to_string()))?;
        handler(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> ServiceRouter {
        ServiceRouter::new()
            .method("reflect", |args| async move {
                Ok::<_, ServiceError>(args.into_iter().next().unwrap_or(Value::Null))
            })
            .method("add", |args| async move {
                let a: i64 = arg(&args, 0)?;
                let b: i64 = arg(&args, 1)?;
                Ok::<_, ServiceError>(Value::from(a + b))
            })
            .method("fail", |_| async move {
                Err::<Value, ServiceError>(anyhow::anyhow!("database unavailable").into())
            })
    }

    #[tokio::test]
    async fn routes_by_method_name() {
        let router = echo();
        assert_eq!(
            router.call("reflect", vec!["hi".into()]).await.unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            router
                .call("add", vec![2i64.into(), 3i64.into()])
                .await
                .unwrap(),
            Value::Int(5)
        );
        assert_eq!(router.methods(), vec!["add", "fail", "reflect"]);
    }

    #[tokio::test]
    async fn unknown_method_and_bad_args_are_reported() {
        let router = echo();
        assert_eq!(
            router.call("missing", vec![]).await.unwrap_err(),
            ServiceError::MethodNotFound("missing".into())
        );
        assert!(matches!(
            router.call("add", vec!["x".into()]).await.unwrap_err(),
            ServiceError::InvalidArguments(_)
        ));
        assert_eq!(
            router.call("fail", vec![]).await.unwrap_err(),
            ServiceError::Failed("database unavailable".into())
        );
    }
}
