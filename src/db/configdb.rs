// db/configdb.rs
use async_trait::async_trait;
use sqlx::Error;

use super::db::DBClient;

#[async_trait]
pub trait AdminConfigExt {
    /// Every `(key, value)` pair in `admin_configs`.
    async fn get_admin_configs(&self) -> Result<Vec<(String, String)>, Error>;
}

#[async_trait]
impl AdminConfigExt for DBClient {
    async fn get_admin_configs(&self) -> Result<Vec<(String, String)>, Error> {
        sqlx::query_as::<_, (String, String)>("SELECT key, value FROM admin_configs")
            .fetch_all(&self.pool)
            .await
    }
}
