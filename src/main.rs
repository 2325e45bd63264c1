pub mod app;
pub mod renderer;

use color_eyre::Result;
use app::App;
use renderer::config::Config;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let config = Config::load()?;
    log::debug!("{:?}", config);

    App::new(config.window, config.renderer).run()
}
