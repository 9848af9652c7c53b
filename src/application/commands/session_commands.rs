//! Session Commands - 会话指令定义

use crate::domain::session::SessionId;

/// 回收孤儿会话
///
/// 进程重启后执行：没有终态事件的会话视为孤儿，
/// 其媒体句柄已随旧进程消亡，直接补记终态
#[derive(Debug, Clone, Default)]
pub struct RecoverOrphanSessionsCommand;

/// 回收结果
#[derive(Debug, Clone)]
pub struct RecoverOrphanSessionsResponse {
    /// 被补记终态的会话
    pub recovered: Vec<SessionId>,
}
