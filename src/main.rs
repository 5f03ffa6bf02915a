use anyhow::Result;

use ferrum::uci::protocol;

fn main() -> Result<()> {
    ferrum::init();

    protocol::run_uci()
}
