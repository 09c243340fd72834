use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{config::{ConfigBases, HttpdConfig}, get_config_or_panic, get_unix_ts, CONFIG};
use crate::metering_p1::decoder::DecoderStats;
use crate::metering_p1::get_p1_status;
use crate::metering_p1::structs::MeterReading;
use crate::mqtt::{get_app_status, MqttConnectionStatus};


pub struct ApiManager {
    config: HttpdConfig,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub mqtt: MqttHealthInfo,
    pub last_valid_telegram_ago_seconds: Option<u64>,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Serialize, ToSchema)]
pub struct MqttHealthInfo {
    pub status: String,
    pub last_connected_ago_seconds: Option<u64>,
    pub last_message_sent_ago_seconds: Option<u64>,
    pub connection_attempts: u64,
}

#[utoipa::path(get,
    path = "/health",
    summary = "Health check endpoint for container monitoring",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    ),
)]
async fn health_check() -> impl Responder {
    let app_status = get_app_status().await;
    let p1_status = get_p1_status().await;
    let mqtt_health = &app_status.mqtt_health;
    let now = std::time::Instant::now();
    let system_time = get_unix_ts();

    let last_connected_ago = mqtt_health.last_connected
        .map(|t| now.duration_since(t).as_secs());
    let last_message_sent_ago = mqtt_health.last_message_sent
        .map(|t| now.duration_since(t).as_secs());
    let last_telegram_ago = p1_status.last_valid_telegram
        .map(|t| system_time.saturating_sub(t));

    let mqtt_status = match &mqtt_health.status {
        MqttConnectionStatus::Connected => "connected",
        MqttConnectionStatus::Disconnected => "disconnected",
        MqttConnectionStatus::Error(_) => "error",
    };

    // Meters send every 1 to 10 seconds, five minutes of silence means trouble
    let overall_healthy = matches!(mqtt_health.status, MqttConnectionStatus::Connected) &&
        last_message_sent_ago.unwrap_or(3600) < 300 &&
        last_telegram_ago.unwrap_or(3600) < 300;

    let response = HealthResponse {
        status: if overall_healthy { "healthy".to_string() } else { "unhealthy".to_string() },
        mqtt: MqttHealthInfo {
            status: mqtt_status.to_string(),
            last_connected_ago_seconds: last_connected_ago,
            last_message_sent_ago_seconds: last_message_sent_ago,
            connection_attempts: mqtt_health.connection_attempts,
        },
        last_valid_telegram_ago_seconds: last_telegram_ago,
        uptime_seconds: app_status.uptime_seconds(),
        timestamp: system_time,
    };

    if overall_healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

#[utoipa::path(get,
    path = "/api/v1/reading",
    summary = "Get the meter reading of the last valid telegram",
    responses(
        (status = 200, description = "Latest published reading", body = MeterReading),
        (status = 404, description = "No valid telegram received yet")
    ),
)]
async fn get_reading() -> impl Responder {
    match get_p1_status().await.last_reading {
        Some(reading) => HttpResponse::Ok().json(reading),
        None => HttpResponse::NotFound().content_type("text/plain").body("No valid telegram received yet"),
    }
}

#[utoipa::path(get,
    path = "/api/v1/stats",
    summary = "Get the line and telegram counters of the decoder",
    responses(
        (status = 200, description = "Decoder statistics", body = DecoderStats)
    ),
)]
async fn get_stats() -> impl Responder {
    HttpResponse::Ok().json(get_p1_status().await.stats)
}

#[utoipa::path(get,
    path = "/api/v1/config",
    summary = "Get the configuration as loaded at startup, without the broker password",
    responses(
        (status = 200, description = "Get current running config")
    ),
)]
async fn get_config() -> impl Responder {
    let config = match CONFIG.read() {
        Ok(holder) => holder.get_complete_config().redacted(),
        Err(_) => return HttpResponse::InternalServerError().body("Config lock poisoned"),
    };
    HttpResponse::Ok().content_type("application/json").json(config)
}

#[derive(OpenApi)]
#[openapi(
    info(description = "dsmr2mqtt API description"),
    paths(
            health_check,
            get_reading,
            get_stats,
            get_config,
    )
)]
struct ApiDoc;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/v1/reading", web::get().to(get_reading))
        .route("/api/v1/stats", web::get().to(get_stats))
        .route("/api/v1/config", web::get().to(get_config));
}

impl ApiManager {
    pub fn new() -> Self {
        let config = get_config_or_panic!("httpd", ConfigBases::Httpd);
        return ApiManager { config };
    }

    pub fn is_enabled(&self) -> bool {
        return self.config.enabled;
    }

    pub async fn start_thread(&self) {
        if !self.config.enabled {
            info!("HTTP API disabled by config");
            return;
        }

        let server = HttpServer::new(move || {
            App::new()
                .configure(routes)
                .service(
                    SwaggerUi::new("/swagger-ui/{_:.*}")
                        .url("/api/v1/openapi.json", ApiDoc::openapi()),
                )
        })
        .bind(("0.0.0.0", self.config.port))
        .map(HttpServer::run);

        match server {
            Ok(server) => {
                info!("HTTP API listening on port {}", self.config.port);
                if let Err(e) = server.await {
                    error!("HTTP API stopped: {e}");
                }
            }
            Err(e) => error!("Unable to bind HTTP API to port {}: {e}", self.config.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use crate::metering_p1::P1_STATUS;

    #[actix_rt::test]
    async fn test_stats_endpoint() {
        let app = test::init_service(App::new().configure(routes)).await;
        let req = test::TestRequest::get().uri("/api/v1/stats").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body.get("telegrams_valid").is_some());
        assert!(body.get("lines_rejected").is_some());
    }

    #[actix_rt::test]
    async fn test_reading_endpoint() {
        {
            let mut status = P1_STATUS.write().await;
            status.last_reading = Some(MeterReading {
                meter_identification: "XMX5LGBBFFB231215493".to_string(),
                consumption_high: 1234567,
                ..Default::default()
            });
        }

        let app = test::init_service(App::new().configure(routes)).await;
        let req = test::TestRequest::get().uri("/api/v1/reading").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body.get("meter_identification").is_some());
        assert!(body.get("consumption_high").is_some());
    }

    #[actix_rt::test]
    async fn test_health_without_broker() {
        let app = test::init_service(App::new().configure(routes)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        /* no broker connection in tests */
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "unhealthy");
    }
}
