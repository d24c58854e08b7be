use actix_web::{middleware, web, App, HttpServer};
use classify::classifier::Classifier;
use classify::config::{Settings, DEFAULT_CONFIG_FILE};
use classify::server::{self, protocol::UploadLimit, routes};
use classify::util::init_tracing;
use std::{env, process};
use tracing::info;

const USAGE: &str = "usage: ./classify [config file]";

fn get_args() -> String {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => DEFAULT_CONFIG_FILE.to_string(),
        2 => args[1].clone(),
        _ => {
            println!("{USAGE}");
            process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load(&get_args())?;
    init_tracing(&settings.log);

    // Loaded once, shared read-only by every request until exit
    let classifier = web::Data::new(Classifier::load(&settings.model)?);
    let limit = web::Data::new(UploadLimit(settings.server.max_upload_bytes));

    let (host, port) = settings.bind_addr();
    info!("listening on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(classifier.clone())
            .app_data(limit.clone())
            .wrap(server::cors())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
