use actix_cors::Cors;
use actix_files::Files;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod handlers;
pub mod render;
pub mod rows;
pub mod state;
pub mod template;
pub mod upload;

pub use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(crate::handlers::generate_slips, crate::handlers::health),
    components(schemas(
        handlers::GenerateSlipsRequest,
        handlers::HealthResponse,
        ErrorResponse,
    )),
    tags((name = "Salary Slips", description = "Batch salary slip generation."))
)]
pub struct ApiDoc;

pub async fn run() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    for dir in [&config.upload_dir, &config.pipeline.output_dir, &config.public_dir] {
        std::fs::create_dir_all(dir)?;
    }

    let template = match template::SlipTemplate::compile(&config.template_path) {
        Ok(template) => Arc::new(template),
        Err(e) => {
            log::error!("Failed to load slip template: {}", e);
            std::process::exit(1);
        }
    };
    let shared = Arc::new(template::SharedContext::load(&config.logo_path));

    log::info!(
        "Delivery mode '{}', render strategy '{}'",
        config.pipeline.delivery.as_str(),
        config.pipeline.strategy.as_str()
    );
    let pipeline = batch::BatchPipeline::from_config(config.pipeline.clone(), template, shared);
    let app_state = web::Data::new(AppState::from_config(&config, pipeline));

    let prometheus = PrometheusMetricsBuilder::new("salary_slip_server")
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let output_dir = config.pipeline.output_dir.clone();
    let public_dir = config.public_dir.clone();
    let cors_origins = config.cors_origins.clone();

    log::info!("Starting server at http://{}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);
        let cors = if cors_origins.is_empty() {
            cors.allow_any_origin()
        } else {
            cors_origins
                .iter()
                .fold(cors, |cors, origin| cors.allowed_origin(origin))
        };

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus.clone())
            .wrap(cors)
            .app_data(app_state.clone())
            .service(web::scope("/api").configure(handlers::config))
            .route("/health", web::get().to(handlers::health))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .service(Files::new(batch::SLIPS_ROUTE, &output_dir))
            .service(Files::new("/", &public_dir).index_file("index.html"))
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .shutdown_timeout(config.shutdown_timeout_secs)
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
