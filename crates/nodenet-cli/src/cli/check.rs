use crate::cli::{report_problems, CheckArgs};
use crate::scenario::Scenario;
use anyhow::Result;

pub fn run(args: CheckArgs) -> Result<()> {
    let scenario = match Scenario::load(&args.scenario) {
        Ok(s) => s,
        Err(e) => {
            println!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    if report_problems(&args.scenario, &scenario.validate()) {
        std::process::exit(1);
    }

    println!(
        "✅ {} is valid: {} steps, {} ticks.",
        args.scenario.display(),
        scenario.steps.len(),
        scenario.tick_count()
    );
    Ok(())
}
