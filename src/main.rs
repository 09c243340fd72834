use dsmr2mqtt::{config::ConfigBases, get_config_or_panic, mqtt::{publish_uptime, MqttManager}, P1Manager};
use tokio::task::JoinHandle;
use std::time::Duration;
use log::{error, info};


#[cfg_attr(feature = "api", actix_web::main)]
#[cfg_attr(not(feature = "api"), tokio::main)]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("P1_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let mqtt_config = get_config_or_panic!("mqtt", ConfigBases::Mqtt);

    // the P1 reader hands readings and subscriptions to the MQTT manager
    let (mut mqtt, tx) = MqttManager::new()?;

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    threads.push(tokio::spawn(async move {
        mqtt.start_thread().await;
    }));

    let mut p1 = P1Manager::new(tx.clone());
    threads.push(tokio::spawn(async move {
        p1.start_thread().await;
    }));

    /* Run our api gateway now */
    #[cfg(feature = "api")]
    {
        let api = dsmr2mqtt::ApiManager::new();
        if api.is_enabled() {
            threads.push(tokio::spawn(async move {
                api.start_thread().await;
            }));
        }
    }

    /* Periodic uptime publishing */
    let uptime_sender = tx.clone();
    let base_topic = mqtt_config.base_topic.clone();
    threads.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            publish_uptime(&uptime_sender, &base_topic).await;
        }
    }));
    drop(tx);

    info!("All modules started, now waiting for a signal to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let kill_all_tasks = threads.iter().any(|task| task.is_finished());

        if kill_all_tasks {
            error!("A task stopped, shutting down");
            for task in threads.iter_mut() {
                task.abort();
            }
            break;
        }
    }
    Ok(())
}
