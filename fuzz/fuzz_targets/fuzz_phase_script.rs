#![no_main]

use libfuzzer_sys::fuzz_target;
use lesim::phase::{Declarations, World};
use lesim::variables::Variables;
use rand::SeedableRng;
use rand::rngs::StdRng;

fuzz_target!(|data: &[u8]| {
    let Ok(script) = std::str::from_utf8(data) else {
        return;
    };
    let declarations = Declarations::new(["lever", "reward", "light"], ["R", "R0"], Variables::new());
    let Ok(registry) = lesim::script::compile(script, declarations) else {
        return;
    };

    // Compiled scripts must also run without panicking
    let labels: Vec<String> = registry.labels().map(String::from).collect();
    let Ok(mut world) = World::new(&registry, &labels) else {
        return;
    };
    let mut rng = StdRng::seed_from_u64(0);
    let mut response = None;
    for _ in 0..256 {
        match world.next_stimulus(response, &mut rng) {
            Ok(step) if !step.is_end() => response = Some("R"),
            _ => break,
        }
    }
});
