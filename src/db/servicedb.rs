// db/servicedb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::servicemodel::{Service, ServiceConfig};

/// Read-only view of the service catalog.
#[async_trait]
pub trait ServiceCatalogExt {
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, Error>;

    async fn get_service_config(&self, service_id: Uuid) -> Result<Option<ServiceConfig>, Error>;

    /// A service with no area mapping is offered everywhere; otherwise the
    /// city/state pair must match one of its active areas.
    async fn is_service_available_in_area(
        &self,
        service_id: Uuid,
        city: &str,
        state: &str,
    ) -> Result<bool, Error>;
}

#[async_trait]
impl ServiceCatalogExt for DBClient {
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, Error> {
        sqlx::query_as::<_, Service>(
            r#"
            SELECT * FROM services
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_service_config(&self, service_id: Uuid) -> Result<Option<ServiceConfig>, Error> {
        sqlx::query_as::<_, ServiceConfig>(
            r#"
            SELECT * FROM service_configs
            WHERE service_id = $1 AND is_active = true
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn is_service_available_in_area(
        &self,
        service_id: Uuid,
        city: &str,
        state: &str,
    ) -> Result<bool, Error> {
        let available: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT
                NOT EXISTS (
                    SELECT 1 FROM service_area_services sas
                    WHERE sas.service_id = $1
                )
                OR EXISTS (
                    SELECT 1 FROM service_area_services sas
                    JOIN service_areas sa ON sa.id = sas.service_area_id
                    WHERE sas.service_id = $1
                      AND sa.is_active = true
                      AND LOWER(sa.city) = LOWER($2)
                      AND LOWER(sa.state) = LOWER($3)
                )
            "#,
        )
        .bind(service_id)
        .bind(city)
        .bind(state)
        .fetch_one(&self.pool)
        .await?;

        Ok(available.unwrap_or(false))
    }
}
