//! 会话存储
//!
//! 会话 id -> 元数据（创建时间、查询计数、最后活跃时间）+ 消息记录；首次引用即创建，进程内不自动销毁。
//! 外层 RwLock 只保护映射表本身，每个会话各有一把 Mutex：不同会话的查询互不阻塞，
//! 同一会话的查询串行化以保证记录顺序。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::memory::Message;

/// 会话元数据；list/info 返回副本，修改副本不影响存储
#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub created_at: DateTime<Utc>,
    pub last_query_at: Option<DateTime<Utc>>,
    /// 每接受一次顶层查询恰好加一，与内部重试次数无关
    pub query_count: u64,
}

impl SessionMeta {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            last_query_at: None,
            query_count: 0,
        }
    }
}

/// 单个会话：元数据与只追加的消息记录
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub meta: SessionMeta,
    pub transcript: Vec<Message>,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            meta: SessionMeta::new(),
            transcript: Vec::new(),
        }
    }

    /// 接受一次顶层查询：计数加一并刷新活跃时间
    pub fn begin_query(&mut self) {
        self.meta.query_count += 1;
        self.meta.last_query_at = Some(Utc::now());
        tracing::info!(session = %self.id, query = self.meta.query_count, "query accepted");
    }
}

fn fresh_session_id() -> String {
    format!("session_{}", uuid::Uuid::new_v4())
}

/// 会话存储：映射表 + 「当前会话」id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    current: RwLock<String>,
}

impl SessionStore {
    /// 初始当前 id 即分配，但会话记录延迟到首次查询时创建
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            current: RwLock::new(fresh_session_id()),
        }
    }

    /// 解析会话：给定 id 则用之（未知则新建记录），省略则用当前 id。
    /// 返回 (id, 会话句柄)；调用方锁住句柄即独占该会话。
    pub async fn resolve(&self, id: Option<&str>) -> (String, Arc<Mutex<Session>>) {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.current.read().await.clone(),
        };
        if let Some(session) = self.sessions.read().await.get(&id) {
            return (id, session.clone());
        }
        let mut sessions = self.sessions.write().await;
        // 写锁下二次检查，避免并发首查时重复创建
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id.clone()))))
            .clone();
        (id, session)
    }

    /// 生成全新会话 id 并设为当前；旧会话记录保留
    pub async fn new_session(&self) -> String {
        let id = fresh_session_id();
        *self.current.write().await = id.clone();
        tracing::info!(session = %id, "new session started");
        id
    }

    /// 切换当前会话 id；记录同样延迟到首次查询时创建
    pub async fn set_current(&self, id: &str) {
        *self.current.write().await = id.to_string();
    }

    pub async fn current(&self) -> String {
        self.current.read().await.clone()
    }

    /// 查询会话元数据；id 省略时用当前 id；未创建过记录的 id 返回 None
    pub async fn info(&self, id: Option<&str>) -> Option<SessionMeta> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.current.read().await.clone(),
        };
        let session = self.sessions.read().await.get(&id)?.clone();
        let guard = session.lock().await;
        Some(guard.meta.clone())
    }

    /// 全部会话元数据的深拷贝快照
    pub async fn list(&self) -> HashMap<String, SessionMeta> {
        let handles: Vec<(String, Arc<Mutex<Session>>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect()
        };
        let mut snapshot = HashMap::with_capacity(handles.len());
        for (id, session) in handles {
            let guard = session.lock().await;
            snapshot.insert(id, guard.meta.clone());
        }
        snapshot
    }

    /// 清空指定会话的消息记录（元数据保留）
    pub async fn clear_transcript(&self, id: &str) {
        if let Some(session) = self.sessions.read().await.get(id).cloned() {
            session.lock().await.transcript.clear();
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_creates_on_first_reference() {
        let store = SessionStore::new();
        assert!(store.info(Some("abc")).await.is_none());
        let (id, session) = store.resolve(Some("abc")).await;
        assert_eq!(id, "abc");
        assert_eq!(session.lock().await.id, "abc");
        assert_eq!(session.lock().await.meta.query_count, 0);
        assert!(store.info(Some("abc")).await.is_some());
    }

    #[tokio::test]
    async fn test_resolve_defaults_to_current() {
        let store = SessionStore::new();
        let current = store.current().await;
        let (id, _) = store.resolve(None).await;
        assert_eq!(id, current);
    }

    #[tokio::test]
    async fn test_new_session_ids_are_distinct() {
        let store = SessionStore::new();
        let first = store.current().await;
        let second = store.new_session().await;
        let third = store.new_session().await;
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(store.current().await, third);
    }

    #[tokio::test]
    async fn test_new_session_keeps_prior_record() {
        let store = SessionStore::new();
        let (old_id, session) = store.resolve(None).await;
        session.lock().await.begin_query();
        store.new_session().await;
        let info = store.info(Some(&old_id)).await;
        assert_eq!(info.map(|m| m.query_count), Some(1));
    }

    #[tokio::test]
    async fn test_begin_query_increments_count() {
        let store = SessionStore::new();
        let (_, session) = store.resolve(Some("s1")).await;
        {
            let mut guard = session.lock().await;
            guard.begin_query();
            guard.begin_query();
        }
        let info = store.info(Some("s1")).await.expect("session exists");
        assert_eq!(info.query_count, 2);
        assert!(info.last_query_at.is_some());
    }

    #[tokio::test]
    async fn test_list_returns_deep_copy() {
        let store = SessionStore::new();
        store.resolve(Some("s1")).await;
        let mut snapshot = store.list().await;
        snapshot
            .get_mut("s1")
            .map(|m| m.query_count = 999)
            .expect("snapshot entry");
        assert_eq!(
            store.info(Some("s1")).await.map(|m| m.query_count),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_block() {
        let store = SessionStore::new();
        let (_, a) = store.resolve(Some("a")).await;
        let (_, b) = store.resolve(Some("b")).await;
        let _hold_a = a.lock().await;
        // 会话 a 被长期持有时，会话 b 仍可立即上锁
        let acquired =
            tokio::time::timeout(std::time::Duration::from_millis(50), b.lock()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_clear_transcript_keeps_meta() {
        let store = SessionStore::new();
        let (_, session) = store.resolve(Some("s1")).await;
        {
            let mut guard = session.lock().await;
            guard.begin_query();
            guard.transcript.push(Message::user("hello"));
        }
        store.clear_transcript("s1").await;
        assert!(session.lock().await.transcript.is_empty());
        assert_eq!(
            store.info(Some("s1")).await.map(|m| m.query_count),
            Some(1)
        );
    }
}
