//! 远程接口声明
//!
//! 消费者只需要知道方法名和位置参数个数，不依赖服务端的具体实现类型。

use crate::error::{Result, RpcError};
use std::collections::BTreeMap;

/// 参数个数约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// 任意个数
    Variadic,
}

/// 远程服务接口描述
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    methods: BTreeMap<String, Arity>,
}

impl ServiceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明固定参数个数的方法
    pub fn method(mut self, name: impl Into<String>, arity: usize) -> Self {
        self.methods.insert(name.into(), Arity::Exact(arity));
        self
    }

    /// 声明参数个数不限的方法
    pub fn variadic(mut self, name: impl Into<String>) -> Self {
        self.methods.insert(name.into(), Arity::Variadic);
        self
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, Arity)> {
        self.methods.iter().map(|(name, arity)| (name.as_str(), *arity))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// 本地校验调用：方法必须已声明，参数个数必须匹配
    pub fn check(&self, service: &str, method: &str, argc: usize) -> Result<()> {
        match self.methods.get(method) {
            None => Err(RpcError::MethodNotDeclared {
                service: service.to_string(),
                method: method.to_string(),
            }),
            Some(Arity::Exact(expected)) if *expected != argc => Err(RpcError::ArityMismatch {
                method: method.to_string(),
                expected: *expected,
                actual: argc,
            }),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_method_and_arity() {
        let d = ServiceDescriptor::new().method("reflect", 1).variadic("log");
        assert!(d.check("echo", "reflect", 1).is_ok());
        assert!(d.check("echo", "log", 0).is_ok());
        assert!(d.check("echo", "log", 5).is_ok());
        assert!(matches!(
            d.check("echo", "reflect", 2),
            Err(RpcError::ArityMismatch { expected: 1, actual: 2, .. })
        ));
        assert!(matches!(
            d.check("echo", "missing", 0),
            Err(RpcError::MethodNotDeclared { .. })
        ));
    }
}
