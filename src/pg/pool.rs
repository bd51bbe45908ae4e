use deadpool_postgres::tokio_postgres::NoTls;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use log::{info, warn};

use super::{PgError, PgResult};

pub const POOL_SIZE_DEFAULT: usize = 20;

/// Connection pool for one configured PostGIS source. Tile queries run in
/// read-only transactions; a read-write connection still works, so it is
/// only warned about at connect time.
#[derive(Clone, Debug)]
pub struct PgPool {
    id: String,
    pool: Pool,
}

impl PgPool {
    pub async fn new(dsn: &str, pool_size: usize) -> PgResult<Self> {
        let pg_config: deadpool_postgres::tokio_postgres::Config =
            dsn.parse().map_err(PgError::BadDsn)?;
        let id = pg_config.get_dbname().map_or_else(
            || format!("{:?}", pg_config.get_hosts().first()),
            ToString::to_string,
        );

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(pool_size)
            .build()
            .map_err(|e| PgError::PoolBuild(e, id.clone()))?;

        let conn = get_conn(&pool, &id).await?;
        let read_only: String = conn
            .query_one("SHOW transaction_read_only", &[])
            .await
            .map(|row| row.get(0))?;
        if read_only == "off" {
            warn!("PostGIS source [{id}] is connected read-write; consider a read-only endpoint");
        }
        info!("Connected to PostGIS source [{id}]");

        Ok(Self { id, pool })
    }

    pub async fn get(&self) -> PgResult<Object> {
        get_conn(&self.pool, &self.id).await
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

async fn get_conn(pool: &Pool, id: &str) -> PgResult<Object> {
    pool.get()
        .await
        .map_err(|e| PgError::PoolConn(e, id.to_string()))
}
