//! Conway's game of life on a reactive ECS world.
//!
//! Every cell is an entity with a grid position and a liveness component.
//! One system computes each cell's next state from its neighbors, a second
//! commits the computed state, and a third renders the grid. Run with:
//!
//! ```text
//! cargo run --example life
//! ```

use std::collections::HashSet;

use reflex_ecs::component;
use reflex_ecs::ecs::{
    query::{Descriptor, with},
    system::{Attributes, Queries, QueryDecl, System},
    world::{Frame, World},
};

const WIDTH: i32 = 40;
const HEIGHT: i32 = 20;
const GENERATIONS: usize = 60;

component! {
    /// A cell's grid position.
    struct Position {
        x: number,
        y: number,
    }
}

component! {
    /// A cell's current and computed-next liveness.
    struct Life {
        alive: boolean,
        next: boolean,
    }
}

fn cell_query() -> QueryDecl {
    QueryDecl::new("cells", Descriptor::new([with::<Position>(), with::<Life>()]))
}

/// Computes every cell's next state from its live neighbors.
struct Step;

impl System for Step {
    fn queries(&self) -> Vec<QueryDecl> {
        vec![cell_query()]
    }

    fn execute(&mut self, queries: &Queries, frame: &mut Frame<'_>, _delta: f32, _time: f64) {
        let cells = queries.get("cells");

        let mut live = HashSet::new();
        for entity in cells.iter() {
            let reader = frame.entity(*entity).unwrap();
            if reader.get::<Life>().unwrap().boolean("alive") {
                let position = reader.get::<Position>().unwrap();
                live.insert((position.number("x") as i32, position.number("y") as i32));
            }
        }

        for entity in cells.iter() {
            let (x, y, alive) = {
                let reader = frame.entity(*entity).unwrap();
                let position = reader.get::<Position>().unwrap();
                (
                    position.number("x") as i32,
                    position.number("y") as i32,
                    reader.get::<Life>().unwrap().boolean("alive"),
                )
            };
            let mut neighbors = 0;
            for dx in -1..=1 {
                for dy in -1..=1 {
                    if (dx, dy) != (0, 0) && live.contains(&(x + dx, y + dy)) {
                        neighbors += 1;
                    }
                }
            }
            let next = matches!((alive, neighbors), (true, 2) | (_, 3));
            frame
                .entity_mut(*entity)
                .unwrap()
                .get_mut::<Life>()
                .unwrap()
                .set_boolean("next", next);
        }
    }
}

/// Commits the computed next state.
struct Commit;

impl System for Commit {
    fn queries(&self) -> Vec<QueryDecl> {
        vec![cell_query()]
    }

    fn execute(&mut self, queries: &Queries, frame: &mut Frame<'_>, _delta: f32, _time: f64) {
        for entity in queries.get("cells").iter() {
            let mut writer = frame.entity_mut(*entity).unwrap();
            let mut life = writer.get_mut::<Life>().unwrap();
            let next = life.value("next").as_bool().unwrap_or(false);
            life.set_boolean("alive", next);
        }
    }
}

/// Renders the grid to stdout.
struct Render;

impl System for Render {
    fn queries(&self) -> Vec<QueryDecl> {
        vec![cell_query()]
    }

    fn execute(&mut self, queries: &Queries, frame: &mut Frame<'_>, _delta: f32, time: f64) {
        let mut live = HashSet::new();
        for entity in queries.get("cells").iter() {
            let reader = frame.entity(*entity).unwrap();
            if reader.get::<Life>().unwrap().boolean("alive") {
                let position = reader.get::<Position>().unwrap();
                live.insert((position.number("x") as i32, position.number("y") as i32));
            }
        }

        let mut screen = String::new();
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                screen.push(if live.contains(&(x, y)) { '#' } else { '.' });
            }
            screen.push('\n');
        }
        println!("tick {time:.0}\n{screen}");
    }
}

fn main() {
    let mut world = World::new();
    world.register_component::<Position>(Default::default());
    world.register_component::<Life>(Default::default());
    world.register_system(Step, Attributes::with_priority(0));
    world.register_system(Commit, Attributes::with_priority(1));
    world.register_system(Render, Attributes::with_priority(2));

    // A glider plus a blinker.
    let seed = [(2, 1), (3, 2), (1, 3), (2, 3), (3, 3), (20, 10), (21, 10), (22, 10)];
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let entity = world.spawn();
            let mut cell = world.entity_mut(entity).unwrap();
            cell.add_with::<Position>(&[("x", (x as f64).into()), ("y", (y as f64).into())]);
            cell.add_with::<Life>(&[("alive", seed.contains(&(x, y)).into())]);
        }
    }

    for generation in 0..GENERATIONS {
        world.execute_with(1.0, generation as f64);
    }

    let stats = world.stats();
    println!(
        "entities: {}, queries: {}, pool used: {}",
        stats.entities, stats.queries.len(), stats.pools[1].used
    );
}
