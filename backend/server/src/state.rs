use std::sync::Arc;

use catalog::{Fixtures, Resource, load_fixtures};
use tracing::{info, warn};

use super::{
    config::{Config, StoreBackend},
    database::{DocumentStore, MemoryStore, RedisStore},
    results::{AdvancedResults, Populate},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub bootcamps: AdvancedResults,
    pub courses: AdvancedResults,
    pub reviews: AdvancedResults,
}

impl State {
    pub async fn new() -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let config = Config::load()?;

        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Redis => {
                info!("Connecting to Redis at {}", config.redis_url);
                let store = RedisStore::connect(&config.redis_url).await?;
                seed(&store, &config).await?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                let fixtures = match &config.seed_dir {
                    Some(dir) => load_fixtures(dir).map_err(|e| e.to_string())?,
                    None => Fixtures::default(),
                };
                info!("Using in-memory store with {} seeded records", fixtures.len());
                Arc::new(MemoryStore::seeded(&fixtures))
            }
        };

        Ok(Arc::new(Self::with_store(config, store)))
    }

    pub fn with_store(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            bootcamps: AdvancedResults::new(store.clone(), Resource::Bootcamps)
                .populate(bootcamp_courses()),
            courses: AdvancedResults::new(store.clone(), Resource::Courses)
                .populate(bootcamp_summary()),
            reviews: AdvancedResults::new(store.clone(), Resource::Reviews)
                .populate(bootcamp_summary()),
            config,
            store,
        }
    }
}

/// Reverse relation: every course pointing at a bootcamp.
pub fn bootcamp_courses() -> Populate {
    Populate::virtual_field("courses", Resource::Courses, "bootcamp")
}

/// The owning bootcamp, trimmed to what a listing needs.
pub fn bootcamp_summary() -> Populate {
    Populate::reference("bootcamp", Resource::Bootcamps).fields(&["name", "description"])
}

async fn seed(
    store: &RedisStore,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(dir) = &config.seed_dir else {
        return Ok(());
    };

    let fixtures = load_fixtures(dir).map_err(|e| e.to_string())?;
    warn!("Seeding Redis from {} ({} records)", dir.display(), fixtures.len());

    for resource in Resource::ALL {
        for document in fixtures.get(resource) {
            store.insert(resource, document.clone()).await?;
        }
    }

    Ok(())
}
