//! 锁定通知测试
