use anyhow::Result;
use pg_opsd::cli::{actions, actions::Action, start};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    match action {
        Action::Run(_) => actions::run::handle(action).await?,
    }

    Ok(())
}
