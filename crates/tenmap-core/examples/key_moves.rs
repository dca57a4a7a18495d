//! Building a tensor map and moving key dimensions around.
//!
//! This example demonstrates the structural operations of tenmap-core:
//! - Building Labels, blocks with gradients, and a tensor map
//! - Merging blocks along samples with `keys_to_samples`
//! - Merging blocks along properties with `keys_to_properties`
//! - Splitting them again with `samples_to_keys`
//!
//! Run with:
//! ```bash
//! cargo run --example key_moves
//! ```

use std::sync::Arc;

use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};

fn main() -> anyhow::Result<()> {
    println!("=== TenMap Core: Key Moves ===\n");

    let map = build_map()?;
    describe("Original map", &map);

    // Example 1: one block per (l), species becomes a sample column
    let merged = map.keys_to_samples(&["species"], true)?;
    describe("After keys_to_samples([species])", &merged);

    // Example 2: one block per (species), l becomes a property column
    let by_properties = map.keys_to_properties(&["l"], false)?;
    describe("After keys_to_properties([l])", &by_properties);

    // Example 3: splitting the merged blocks again
    let split = merged.samples_to_keys(&["species"])?;
    describe("After samples_to_keys([species])", &split);

    println!("\n=== All examples completed successfully! ===");
    Ok(())
}

fn build_map() -> anyhow::Result<TensorMap> {
    let samples = Arc::new(Labels::new(["structure", "center"], &[[0, 0], [0, 1], [1, 0]])?);
    let properties = Arc::new(Labels::new(["n"], &[[0], [1]])?);
    let xyz = Arc::new(Labels::new(["xyz"], &[[0], [1], [2]])?);

    let keys = Labels::new(["l", "species"], &[[0, 1], [0, 6], [1, 1], [1, 6]])?;
    let mut blocks = Vec::new();
    for (i, _) in keys.iter().enumerate() {
        let values: Vec<f64> = (0..6).map(|v| (10 * i + v) as f64).collect();
        let gradient = TensorBlock::new(
            DenseArray::from_elem(&[2, 3, 2], -(i as f64)),
            Labels::new(["sample", "atom"], &[[0, 1], [2, 0]])?,
            vec![xyz.clone()],
            properties.clone(),
        )?;
        let block = TensorBlock::new(
            DenseArray::from_vec(values, &[3, 2])?,
            samples.clone(),
            vec![],
            properties.clone(),
        )?
        .with_gradient("positions", gradient)?;
        blocks.push(block);
    }

    Ok(TensorMap::new(keys, blocks)?)
}

fn describe(title: &str, map: &TensorMap) {
    println!("--- {} ---", title);
    println!("  keys: {:?}", map.keys().names());
    for (key, block) in map.iter() {
        println!(
            "  {:?}: shape {:?}, samples {:?}, properties {:?}, gradient rows {}",
            key,
            block.shape(),
            block.samples().names(),
            block.properties().names(),
            block
                .gradient("positions")
                .map(|g| g.samples().count())
                .unwrap_or(0)
        );
    }
    println!();
}
