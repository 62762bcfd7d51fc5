use std::env;

/// Info everywhere; debug for `module` and this crate when `RUST_LOG=debug`.
pub fn logger_init(module: &str) {
    let crate_level =
        if env::var(pretty_env_logger::env_logger::DEFAULT_FILTER_ENV).unwrap_or_default() == "debug"
        {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };

    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .filter_module(module, crate_level)
        .filter_module("mensa_archive_rs", crate_level)
        .init();
}
