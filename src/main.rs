use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkroute::cache::{GenerateCache, MemoryCacheService, RedisCacheService, ResponseCache};
use walkroute::config::Config;
use walkroute::db::{AnalyticsSink, LogAnalyticsSink, PgAnalyticsSink};
use walkroute::services::directions::{AuthMode, MapboxClient};
use walkroute::services::places::OverpassClient;
use walkroute::services::ranker::{HttpRankerClient, Ranker};
use walkroute::services::route_pipeline::RoutePipeline;
use walkroute::services::text_gen::GeminiClient;
use walkroute::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "walkroute=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| format!("Failed to load configuration: {}", e))?;

    tracing::info!("Starting walkroute API server");

    // Analytics: Postgres when configured, otherwise log-only
    let analytics: Arc<dyn AnalyticsSink> = match config.database_url {
        Some(ref database_url) => {
            tracing::info!("Connecting to analytics database...");
            let pool = walkroute::db::create_pool(database_url).await?;
            let sink = PgAnalyticsSink::new(pool);
            sink.ensure_schema().await?;
            tracing::info!("Analytics tables ready");
            Arc::new(sink)
        }
        None => {
            tracing::info!("DATABASE_URL not configured. Analytics rows are only logged.");
            Arc::new(LogAnalyticsSink)
        }
    };

    // Response cache: try Redis, fall back to in-memory
    let cache = if config.response_cache_enabled {
        let backend: Arc<dyn ResponseCache> = match config.redis_url {
            Some(ref redis_url) => {
                match RedisCacheService::new(
                    redis_url,
                    config.response_cache_ttl,
                    config.response_cache_max_entries,
                )
                .await
                {
                    Ok(redis_cache) => Arc::new(redis_cache),
                    Err(e) => {
                        tracing::warn!(
                            "Failed to connect to Redis: {}. Falling back to in-memory cache.",
                            e
                        );
                        Arc::new(MemoryCacheService::new(
                            config.response_cache_ttl,
                            config.response_cache_max_entries,
                        ))
                    }
                }
            }
            None => {
                tracing::info!("Redis URL not configured. Using in-memory cache.");
                Arc::new(MemoryCacheService::new(
                    config.response_cache_ttl,
                    config.response_cache_max_entries,
                ))
            }
        };
        Some(GenerateCache::new(backend, config.response_cache_ttl))
    } else {
        tracing::info!("Response cache disabled");
        None
    };

    // External collaborators
    let pipeline_config = config.pipeline.clone();
    let directions = match config.mapbox_base_url {
        Some(ref base_url) => MapboxClient::with_config(
            config.mapbox_api_key.clone(),
            base_url.clone(),
            AuthMode::BearerHeader,
            pipeline_config.directions_timeout(),
        ),
        None => MapboxClient::new(
            config.mapbox_api_key.clone(),
            pipeline_config.directions_timeout(),
        ),
    };
    let places = OverpassClient::new(config.overpass_url.clone(), pipeline_config.places_timeout());
    let ranker: Option<Arc<dyn Ranker>> = match config.ranker_url {
        Some(ref url) => Some(Arc::new(HttpRankerClient::new(
            url.clone(),
            config.ranker_token.clone(),
            pipeline_config.ranker_timeout(),
        ))),
        None => {
            tracing::info!("RANKER_URL not configured. Routes get heuristic scores.");
            None
        }
    };
    let text_gen = GeminiClient::new(
        config.text_gen_base_url.clone(),
        config.text_gen_model.clone(),
        config.text_gen_api_key.clone(),
        pipeline_config.text_gen_timeout(),
    );

    let pipeline = RoutePipeline::new(
        Arc::new(directions),
        Arc::new(places),
        ranker,
        Arc::new(text_gen),
        analytics.clone(),
        pipeline_config,
    );

    // Create application state
    let state = Arc::new(AppState {
        pipeline,
        cache,
        analytics,
    });

    // Build router with CORS and tracing
    let app = Router::new()
        .merge(walkroute::routes::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.server_address();
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
