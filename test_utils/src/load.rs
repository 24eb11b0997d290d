use ::test_utils::*;
use georegistry_core::georegistry::*;
use std::env;
use std::path::Path;

fn main() -> Result<(), failure::Error> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        panic!(
            "Expected at least 2 arguments: a data directory and a registry path, optionally \
             followed by a max batch size and country codes"
        )
    }
    init_logging();

    let mut options = LoadOptions::default();
    if let Some(max_batch_size) = args.get(3) {
        options.max_batch_size = max_batch_size.parse()?;
    }
    let countries: Vec<CountryCode> = if args.len() > 4 {
        args[4..].iter().map(|code| code.parse()).collect::<Result<_, _>>()?
    } else {
        COUNTRIES.iter().map(|code| code.parse()).collect::<Result<_, _>>()?
    };

    let registry = RocksRegistry::open(&args[2], RegistryOptions::default())?;
    let summary = load_countries(&registry, Path::new(&args[1]), &countries, options)?;
    print!("{}", format_summary(&summary, &options));
    Ok(())
}
