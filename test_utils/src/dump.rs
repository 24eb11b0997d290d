use ::test_utils::dump_registry_to_json;
use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        panic!("Expected 2 arguments: a registry path and an output path")
    }
    dump_registry_to_json(&args[1], &args[2]).unwrap();
}
