use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    config::AppConfig,
    db::DbPool,
    error::AppError,
    services::{board::BoardService, store::BoardStore},
    session::SessionStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub board: BoardService,
    pub sessions: SessionStore,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: AppConfig, board: BoardService, sessions: SessionStore) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);
        Self {
            config,
            board,
            sessions,
            cookie_key,
        }
    }

    /// Wires the board service over an already migrated pool.
    pub async fn build(config: AppConfig, db: DbPool) -> Result<Self, AppError> {
        let board = BoardService::start(BoardStore::new(db)).await?;
        Ok(Self::new(config, board, SessionStore::new()))
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
