use actix_web::{web, App, HttpServer};
use balancer::config::BalancerConfig;
use balancer::cors::cors_middleware;
use balancer::routes;
use balancer::state::AppState;

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: Set via docker-compose env_file or docker run --env-file
    // - Local dev: Source env files manually (e.g., set -a; . ./.env; set +a)
    let config = match BalancerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let bind_addr = config.bind_addr.clone();
    let instance_count = config.instances.len();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ Failed to build balancer state: {e}");
            std::process::exit(1);
        }
    };
    state.spawn_prober();

    println!("🚀 Starting Hokm balancer on http://{bind_addr} ({instance_count} instances)");

    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(cors_middleware())
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .workers(num_cpus::get())
    .bind(bind_addr.as_str())?
    .run()
    .await
}
