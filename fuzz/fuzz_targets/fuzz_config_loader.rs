#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    let Ok(cfg) = grinder_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // a config the file loader accepts must also satisfy the runtime checks
        let core: grinder_core::GrinderCfg = (&cfg).into();
        assert!(core.validate().is_ok(), "{:?}", core);
    }
});
