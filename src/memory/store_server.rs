// src/memory/store_server.rs — Async message passing for Store

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::infra::errors::JieyouError;
use crate::memory::store::{ChatTurn, Store, UserRow};
use crate::memory::ChatStore;
use crate::provider::Role;

#[derive(Debug)]
pub enum StoreCommand {
    FindUser {
        openid: String,
        resp: oneshot::Sender<anyhow::Result<Option<UserRow>>>,
    },
    GetOrCreateUser {
        openid: String,
        nickname: String,
        resp: oneshot::Sender<anyhow::Result<UserRow>>,
    },
    AppendTurn {
        user_id: i64,
        msg_id: String,
        role: Role,
        content: String,
        resp: oneshot::Sender<anyhow::Result<i64>>,
    },
    FindTurn {
        user_id: i64,
        msg_id: String,
        role: Role,
        resp: oneshot::Sender<anyhow::Result<Option<ChatTurn>>>,
    },
    RecentTurns {
        user_id: i64,
        limit: u32,
        resp: oneshot::Sender<anyhow::Result<Vec<ChatTurn>>>,
    },
    ListTurns {
        user_id: i64,
        resp: oneshot::Sender<anyhow::Result<Vec<ChatTurn>>>,
    },
    CountUserTurnsSince {
        user_id: i64,
        since: String,
        resp: oneshot::Sender<anyhow::Result<usize>>,
    },
}

/// A handle to the Store that uses message passing.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(tx: mpsc::Sender<StoreCommand>) -> Self {
        Self { tx }
    }

    pub async fn find_user(&self, openid: String) -> anyhow::Result<Option<UserRow>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::FindUser {
                openid,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn get_or_create_user(
        &self,
        openid: String,
        nickname: String,
    ) -> anyhow::Result<UserRow> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::GetOrCreateUser {
                openid,
                nickname,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn append_turn(
        &self,
        user_id: i64,
        msg_id: String,
        role: Role,
        content: String,
    ) -> anyhow::Result<i64> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::AppendTurn {
                user_id,
                msg_id,
                role,
                content,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn find_turn(
        &self,
        user_id: i64,
        msg_id: String,
        role: Role,
    ) -> anyhow::Result<Option<ChatTurn>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::FindTurn {
                user_id,
                msg_id,
                role,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn recent_turns(&self, user_id: i64, limit: u32) -> anyhow::Result<Vec<ChatTurn>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::RecentTurns {
                user_id,
                limit,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn list_turns(&self, user_id: i64) -> anyhow::Result<Vec<ChatTurn>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::ListTurns {
                user_id,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn count_user_turns_since(
        &self,
        user_id: i64,
        since: String,
    ) -> anyhow::Result<usize> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::CountUserTurnsSince {
                user_id,
                since,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }
}

#[async_trait]
impl ChatStore for StoreHandle {
    async fn find_completed_turn(
        &self,
        user_id: i64,
        msg_id: &str,
    ) -> Result<Option<ChatTurn>, JieyouError> {
        self.find_turn(user_id, msg_id.to_string(), Role::Assistant)
            .await
            .map_err(JieyouError::store)
    }

    async fn append_turn(
        &self,
        user_id: i64,
        msg_id: &str,
        role: Role,
        content: &str,
    ) -> Result<i64, JieyouError> {
        StoreHandle::append_turn(self, user_id, msg_id.to_string(), role, content.to_string())
            .await
            .map_err(JieyouError::store)
    }

    async fn load_recent_turns(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<ChatTurn>, JieyouError> {
        self.recent_turns(user_id, limit)
            .await
            .map_err(JieyouError::store)
    }

    async fn get_or_create_user(
        &self,
        openid: &str,
        nickname: &str,
    ) -> Result<UserRow, JieyouError> {
        StoreHandle::get_or_create_user(self, openid.to_string(), nickname.to_string())
            .await
            .map_err(JieyouError::store)
    }

    async fn find_user(&self, openid: &str) -> Result<Option<UserRow>, JieyouError> {
        StoreHandle::find_user(self, openid.to_string())
            .await
            .map_err(JieyouError::store)
    }

    async fn count_user_turns_since(
        &self,
        user_id: i64,
        since: &str,
    ) -> Result<usize, JieyouError> {
        StoreHandle::count_user_turns_since(self, user_id, since.to_string())
            .await
            .map_err(JieyouError::store)
    }

    async fn list_turns(&self, user_id: i64) -> Result<Vec<ChatTurn>, JieyouError> {
        StoreHandle::list_turns(self, user_id)
            .await
            .map_err(JieyouError::store)
    }
}

/// Helper to spawn the store server and return a handle.
pub fn spawn_store_server(store: Store) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(100);
    let handle = StoreHandle::new(tx);
    let join_handle = tokio::spawn(run_store_server(store, rx));
    (handle, join_handle)
}

/// The background task that owns the Store.
pub async fn run_store_server(store: Store, mut rx: mpsc::Receiver<StoreCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::FindUser { openid, resp } => {
                let _ = resp.send(store.find_user(&openid));
            }
            StoreCommand::GetOrCreateUser {
                openid,
                nickname,
                resp,
            } => {
                let _ = resp.send(store.get_or_create_user(&openid, &nickname));
            }
            StoreCommand::AppendTurn {
                user_id,
                msg_id,
                role,
                content,
                resp,
            } => {
                let res = store.append_turn(user_id, &msg_id, role, &content);
                let _ = resp.send(res);
            }
            StoreCommand::FindTurn {
                user_id,
                msg_id,
                role,
                resp,
            } => {
                let _ = resp.send(store.find_turn(user_id, &msg_id, role));
            }
            StoreCommand::RecentTurns {
                user_id,
                limit,
                resp,
            } => {
                let _ = resp.send(store.recent_turns(user_id, limit));
            }
            StoreCommand::ListTurns { user_id, resp } => {
                let _ = resp.send(store.list_turns(user_id));
            }
            StoreCommand::CountUserTurnsSince {
                user_id,
                since,
                resp,
            } => {
                let _ = resp.send(store.count_user_turns_since(user_id, &since));
            }
        }
    }
    tracing::debug!("Store server stopped: all handles dropped");
}
