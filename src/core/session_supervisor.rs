//! 会话监管：进行中轮次的登记与中断
//!
//! 每个轮次以 uuid 登记一个子 CancellationToken；外部可按 id 中断单个轮次，或一次性取消全部。

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 已登记轮次的句柄
#[derive(Debug, Clone)]
pub struct TurnHandle {
    pub id: Uuid,
    pub token: CancellationToken,
}

/// 轮次生命周期管理
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    root: CancellationToken,
    turns: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新轮次
    pub fn begin(&self) -> TurnHandle {
        let id = Uuid::new_v4();
        let token = self.root.child_token();
        if let Ok(mut turns) = self.turns.lock() {
            turns.insert(id, token.clone());
        }
        tracing::debug!(turn_id = %id, "turn registered");
        TurnHandle { id, token }
    }

    /// 按 id 中断；id 不存在（已结束或从未登记）时返回 false
    pub fn interrupt(&self, id: Uuid) -> bool {
        let token = self
            .turns
            .lock()
            .ok()
            .and_then(|turns| turns.get(&id).cloned());
        match token {
            Some(t) => {
                tracing::info!(turn_id = %id, "turn interrupt requested");
                t.cancel();
                true
            }
            None => false,
        }
    }

    /// 轮次结束后注销
    pub fn finish(&self, id: Uuid) {
        if let Ok(mut turns) = self.turns.lock() {
            turns.remove(&id);
        }
    }

    /// 取消全部轮次（进程退出 / Ctrl+C）
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn active(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or(0)
    }
}
