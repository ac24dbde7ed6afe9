use std::sync::Arc;

use crate::{
    cache::ExpiringCache,
    config::AppConfig,
    db::{DbPool, OrmConn, pool_of},
    geocode::Geocoder,
    mail::EmailQueue,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub cache: Arc<ExpiringCache>,
    pub emails: EmailQueue,
    pub geocoder: Arc<dyn Geocoder>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orm: OrmConn,
        emails: EmailQueue,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        Self {
            pool: pool_of(&orm),
            orm,
            config: Arc::new(config),
            cache: Arc::new(ExpiringCache::new()),
            emails,
            geocoder,
        }
    }
}
