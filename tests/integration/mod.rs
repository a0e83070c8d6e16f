//! 集成测试模块
//!
//! 在真实存储后端上运行登录守卫

#[cfg(feature = "redis")]
#[allow(unused_imports)]
mod redis_test;
