use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::core::db::seed_demo_data;
use crate::core::store::Store;
use crate::nodes::NodeClient;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub nodes: NodeClient,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = match &config.data_file {
            Some(path) => {
                info!("Opening store snapshot at {path}");
                Store::open(path).context("failed to open store")?
            }
            None => {
                info!("Using in-memory store");
                Store::in_memory()
            }
        };

        let nodes = NodeClient::new(config.remote_nodes.clone(), config.outbound_timeout)
            .context("failed to build node client")?;

        let state = Self { config, store, nodes };

        if state.config.seed_demo {
            seed_demo_data(&state.store, &state.config)?;
        }

        Ok(state)
    }
}
