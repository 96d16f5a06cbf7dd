use crate::error::{LedgerError, LedgerResult};
use crate::models::AllocationSubmission;
use crate::service::ports::AllocationStore;
use crate::service::session::CompositionSession;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// 会话注册表 - 会话之间无共享可变状态，每个会话独占自己的账本
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<u64, CompositionSession>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions.insert(id, CompositionSession::new());
        tracing::info!("Session {} created, active sessions: {}", id, self.sessions.len());
        id
    }

    pub fn with_session<R>(
        &self,
        id: u64,
        f: impl FnOnce(&CompositionSession) -> R,
    ) -> LedgerResult<R> {
        let session = self
            .sessions
            .get(&id)
            .ok_or(LedgerError::SessionNotFound(id))?;
        Ok(f(session.value()))
    }

    /// 同步修改会话，锁只在闭包内持有
    pub fn with_session_mut<R>(
        &self,
        id: u64,
        f: impl FnOnce(&mut CompositionSession) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or(LedgerError::SessionNotFound(id))?;
        f(session.value_mut())
    }

    /// 提交会话: 先取出会话再调用持久化 (不跨 await 持有锁)，
    /// 成功后丢弃会话，失败则放回原状
    pub async fn submit(
        &self,
        id: u64,
        store: &dyn AllocationStore,
        date: NaiveDate,
        note: Option<String>,
    ) -> LedgerResult<(i64, AllocationSubmission)> {
        let (_, mut session) = self
            .sessions
            .remove(&id)
            .ok_or(LedgerError::SessionNotFound(id))?;

        match session.submit(store, date, note).await {
            Ok(result) => {
                tracing::info!("Session {} submitted as allocation {}, discarded", id, result.0);
                Ok(result)
            }
            Err(e) => {
                self.sessions.insert(id, session);
                Err(e)
            }
        }
    }

    pub fn discard(&self, id: u64) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
