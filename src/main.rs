use kestrel_stage::cli::CliOverrides;
use kestrel_stage::run_with_overrides;

fn main() {
    let cli_overrides = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    let stage = match run_with_overrides(cli_overrides) {
        Ok(stage) => stage,
        Err(err) => {
            eprintln!("Stage error: {err:?}");
            std::process::exit(1);
        }
    };

    let world = stage.world();
    println!("frame {}: {} entities", world.frame(), world.entity_count());
    for entity in world.preorder() {
        let Some(pose) = world.world_transform(entity) else {
            continue;
        };
        let depth = std::iter::successors(world.parent(entity), |e| world.parent(*e)).count();
        println!(
            "{:indent$}{} pos=({:.3}, {:.3}) rot={:.2} scale=({:.3}, {:.3})",
            "",
            world.name(entity).unwrap_or("?"),
            pose.position.x,
            pose.position.y,
            pose.rotation,
            pose.scale.x,
            pose.scale.y,
            indent = depth * 2
        );
    }
    for pass in world.profiler().summaries() {
        println!(
            "pass {:<14} last {:.3}ms avg {:.3}ms max {:.3}ms ({} samples)",
            pass.name, pass.last_ms, pass.average_ms, pass.max_ms, pass.samples
        );
    }
}
