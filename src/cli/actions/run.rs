use crate::cli::actions::Action;
use crate::driver::RealNodeDriver;
use crate::orchestrator::Orchestrator;
use crate::topology::Topology;
use anyhow::Result;
use std::sync::Arc;

/// Handle the `Run` action: wire the driver/topology/orchestrator and serve.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run(config) => {
            let config = Arc::new(config);
            let driver = Arc::new(RealNodeDriver::new(config.exec_runtime.clone()));
            let topology = Arc::new(Topology::new(
                config.initial_nodes.clone(),
                driver.clone(),
                config.credentials.clone(),
                config.probe_deadline,
            ));
            let orchestrator = Arc::new(Orchestrator::new(
                topology.clone(),
                driver,
                config.credentials.clone(),
                config.promote_deadline,
                config.demote_deadline,
                config.probe_deadline,
            ));

            crate::api::serve(config, topology, orchestrator).await
        }
    }
}
