use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<weave_service::WeaveService>,
}

impl AppState {
	pub async fn new(config: weave_config::Config) -> color_eyre::Result<Self> {
		let db = weave_storage::db::Db::connect(&config.storage.postgres).await?;
		db.ensure_schema().await?;
		let vectors = weave_storage::vectors::VectorStore::new(&config.storage.qdrant)?;
		let service = weave_service::WeaveService::new(config, db, vectors)?;
		Ok(Self { service: Arc::new(service) })
	}
}
