//! Pi-hole integration
//!
//! Configures Pi-hole DNS sinkholes through a multi-step config flow and
//! exposes their statistics as sensors.
//!
//! - [`config_flow`] - The setup wizard: `user`, `api_key`, `reauth`, `reauth_confirm`
//! - [`api`] - Pi-hole v6 REST client behind the [`PiHoleApi`] trait
//! - [`setup`] - Entry setup, polling and unload
//! - [`sensor`] - Statistic sensors
//! - [`constants`] - Keys and defaults shared by all of the above

pub mod api;
pub mod config;
pub mod config_flow;
pub mod constants;
pub mod coordinator;
pub mod sensor;
pub mod setup;

pub use api::{
    ApiFactory, ClientSessions, DataResponse, HoleError, HoleParams, HoleV6, HoleV6Factory,
    PiHoleApi, Summary,
};
pub use config::ConnectionConfig;
pub use config_flow::{async_start_reauth, PiHoleFlowHandler};
pub use coordinator::{Coordinator, UpdateError};
pub use sensor::{PiHoleSensor, SensorEntityDescription, SENSOR_TYPES};
pub use setup::{async_setup_entry, PiHoleIntegration, PiHoleRuntime};

use std::sync::Arc;

use ha_data_entry_flow::{ConfigFlow, FlowManager};

use constants::DOMAIN;

/// Register the Pi-hole config flow and entry setup
pub fn register(flows: &Arc<FlowManager>, factory: Arc<dyn ApiFactory>) -> Arc<PiHoleIntegration> {
    register_integration(
        flows,
        PiHoleIntegration::new(flows.entries(), factory.clone()),
        factory,
    )
}

/// Same as [`register`] with a preconfigured integration
pub fn register_integration(
    flows: &Arc<FlowManager>,
    integration: PiHoleIntegration,
    factory: Arc<dyn ApiFactory>,
) -> Arc<PiHoleIntegration> {
    let integration = Arc::new(integration);
    integration.attach_flows(flows);

    flows.register(
        DOMAIN,
        Arc::new(move || Box::new(PiHoleFlowHandler::new(factory.clone())) as Box<dyn ConfigFlow>),
    );
    flows
        .entries()
        .register_setup_handler(DOMAIN, integration.clone());

    integration
}
