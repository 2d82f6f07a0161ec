use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use server::config::ServerConfig;
use server::routes;
use server::state::AppState;
use server::store::{MemoryBackend, RedisBackend, StoreBackend};

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: Set via docker-compose env_file or docker run --env-file
    // - Local dev: Source env files manually (e.g., set -a; . ./.env; set +a)
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let backend: Arc<dyn StoreBackend> = match &config.redis_url {
        Some(url) => match RedisBackend::connect(url).await {
            Ok(backend) => {
                println!("✅ Redis connected");
                Arc::new(backend)
            }
            Err(e) => {
                eprintln!("❌ Failed to connect to Redis: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("⚠️ REDIS_URL not set, using in-memory store (single instance only)");
            Arc::new(MemoryBackend::new())
        }
    };

    let bind_addr = config.bind_addr.clone();
    let instance_id = config.instance_id.clone();

    println!("🚀 Starting Hokm server {instance_id} on http://{bind_addr}");

    let app_state = AppState::new(config, backend);
    let data = web::Data::new(app_state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .workers(num_cpus::get())
    .bind(bind_addr.as_str())?
    .run()
    .await
}
