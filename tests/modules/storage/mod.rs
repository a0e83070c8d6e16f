//! 存储模块测试

pub mod integration;
