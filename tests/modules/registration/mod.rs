//! 注册限流测试

pub mod integration;
