use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn, Level};

use kontu_identity::config::{EnvironmentConfig, IdentityBackend, IdentityConfig};
use kontu_identity::database::{create_pool, mask_database_url};
use kontu_identity::repositories::{IdentityStore, MemoryIdentityStore, PgIdentityStore, RestIdentityStore};
use kontu_identity::routes::create_router;
use kontu_identity::services::IdentityService;
use kontu_identity::state::AppState;
use kontu_identity::utils::clock::SystemClock;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    let config = EnvironmentConfig::from_env().context("configuración de entorno inválida")?;
    let identity_config = IdentityConfig::from_env().context("configuración de identidad inválida")?;

    // Configurar logging
    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("🏢 Kontu Identity - registro de empresas y usuarios");
    info!("================================================");

    let store = build_store(&config, &identity_config)?;
    let identity = IdentityService::bootstrap(store, identity_config, Arc::new(SystemClock)).await;

    let status = identity.connectivity_status();
    if status.reachable {
        info!("✅ Servicio de datos alcanzable");
    } else {
        warn!("⚠️ Servicio de datos inalcanzable, arrancando en modo offline");
    }

    let app_state = AppState::new(Arc::new(identity), config.clone());
    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("HOST/PORT inválidos")?;

    info!("🌐 Servidor iniciando en {}", config.server_url());
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /api/health/connectivity - Estado del servicio de datos");
    info!("   POST /api/registration/company - Registrar empresa + admin");
    info!("   POST /api/registration/collaborator - Registrar colaborador con invitación");
    info!("   POST /api/auth/login - Login");
    info!("   POST /api/auth/logout - Logout");
    info!("   GET  /api/auth/me - Refrescar sesión");
    info!("   POST /api/password/forgot - Solicitar recuperación");
    info!("   GET  /api/password/reset/:token - Validar token de recuperación");
    info!("   POST /api/password/reset - Cambiar contraseña");
    info!("   POST /api/invitations - Crear invitación (admin)");
    info!("   GET  /api/invitations/:token - Validar invitación");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            e
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}

fn build_store(config: &EnvironmentConfig, identity: &IdentityConfig) -> Result<Arc<dyn IdentityStore>> {
    match config.backend {
        IdentityBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL es obligatoria con IDENTITY_BACKEND=postgres")?;
            info!("🗄️ Store PostgreSQL en {}", mask_database_url(url));
            Ok(Arc::new(PgIdentityStore::new(create_pool(url)?)))
        }
        IdentityBackend::Rest => {
            let url = config
                .data_service_url
                .as_deref()
                .context("DATA_SERVICE_URL es obligatoria con IDENTITY_BACKEND=rest")?;
            let key = config
                .data_service_key
                .as_deref()
                .context("DATA_SERVICE_KEY es obligatoria con IDENTITY_BACKEND=rest")?;
            info!("🛰️ Store REST en {}", url);
            let store = RestIdentityStore::new(url, key, identity.request_timeout)
                .map_err(|e| anyhow::anyhow!("Error creando el cliente REST: {}", e))?;
            Ok(Arc::new(store))
        }
        IdentityBackend::Memory => {
            warn!("🧪 Store en memoria: los datos se pierden al reiniciar");
            Ok(Arc::new(MemoryIdentityStore::new()))
        }
    }
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
