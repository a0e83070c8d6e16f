//! 端到端测试模块
//!
//! 测试完整的登录与注册流程

#[allow(unused_imports)]
mod ledger_maintenance;
#[allow(unused_imports)]
mod lockout_escalation;
