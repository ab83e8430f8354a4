pub mod run;

use crate::config::Config;

#[derive(Debug)]
pub enum Action {
    Run(Config),
}
