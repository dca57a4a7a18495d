//! Saving and loading tensor maps with the TenMap container format.
//!
//! This example demonstrates:
//! - Writing a map to an in-memory buffer and to a file
//! - Choosing the byte order and the checksum trailer
//! - Streaming blocks out of a container one at a time
//! - Detecting a corrupted container
//!
//! Run with:
//! ```bash
//! cargo run --example containers --features subscriber
//! ```

use std::sync::Arc;

use tenmap_core::{DenseArray, Labels, TensorBlock, TensorMap};
use tenmap_io::tracing_support::{init_tracing, TracingConfig};
use tenmap_io::{ByteOrder, ReadConfig, TensorMapReader, WriteConfig};

fn main() -> anyhow::Result<()> {
    init_tracing(TracingConfig::default())?;

    println!("=== TenMap IO: Containers ===\n");

    let map = build_map()?;

    example_buffers(&map)?;
    example_file(&map)?;
    example_streaming(&map)?;
    example_corruption(&map)?;

    println!("\n=== All examples completed successfully! ===");
    Ok(())
}

fn build_map() -> anyhow::Result<TensorMap> {
    let properties = Arc::new(Labels::new(["n"], &[[0], [1], [2], [3]])?);
    let mut blocks = Vec::new();
    for (species, atoms) in [(1, 3), (6, 2), (8, 1)] {
        let values = (0..atoms * 4).map(|i| species as f64 + i as f64 / 10.0).collect();
        let gradient = TensorBlock::new(
            DenseArray::from_elem(&[atoms, 3, 4], -1.0),
            Labels::from_flat(&["sample"], (0..atoms as i32).collect())?,
            vec![Arc::new(Labels::new(["xyz"], &[[0], [1], [2]])?)],
            properties.clone(),
        )?;
        blocks.push(
            TensorBlock::new(
                DenseArray::from_vec(values, &[atoms, 4])?,
                Labels::from_flat(&["atom"], (0..atoms as i32).collect())?,
                vec![],
                properties.clone(),
            )?
            .with_gradient("positions", gradient)?,
        );
    }
    Ok(TensorMap::new(
        Labels::new(["species"], &[[1], [6], [8]])?,
        blocks,
    )?)
}

fn example_buffers(map: &TensorMap) -> anyhow::Result<()> {
    println!("--- In-memory buffers ---");
    for byte_order in [ByteOrder::Little, ByteOrder::Big] {
        let config = WriteConfig::new().byte_order(byte_order);
        let mut bytes = Vec::new();
        tenmap_io::write(&mut bytes, map, &config)?;

        let loaded = tenmap_io::read(bytes.as_slice(), &ReadConfig::default())?;
        println!(
            "{:?} endian: {} bytes, identical after loading: {}",
            byte_order,
            bytes.len(),
            loaded.is_identical(map)
        );
    }
    Ok(())
}

fn example_file(map: &TensorMap) -> anyhow::Result<()> {
    println!("\n--- Files ---");
    let path = std::env::temp_dir().join("tenmap_example.tmap");
    tenmap_io::save(&path, map)?;
    let loaded = tenmap_io::load(&path)?;
    println!(
        "saved to {}, loaded {} blocks",
        path.display(),
        loaded.len()
    );
    std::fs::remove_file(&path)?;
    Ok(())
}

fn example_streaming(map: &TensorMap) -> anyhow::Result<()> {
    println!("\n--- Streaming ---");
    let bytes = tenmap_io::save_buffer(map)?;
    let mut reader = TensorMapReader::new(bytes.as_slice(), ReadConfig::default());
    reader.read_header()?;
    let keys = reader.read_keys()?;

    let mut index = 0;
    while let Some(block) = reader.next_block()? {
        println!(
            "key {:?}: shape {:?}, gradients {:?}",
            keys.row(index),
            block.shape(),
            block.gradient_parameters()
        );
        index += 1;
    }
    Ok(())
}

fn example_corruption(map: &TensorMap) -> anyhow::Result<()> {
    println!("\n--- Corruption ---");
    let mut bytes = tenmap_io::save_buffer(map)?;
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xff;

    match tenmap_io::load_buffer(&bytes) {
        Ok(_) => println!("corruption went unnoticed"),
        Err(e) => println!("rejected: {}", e),
    }
    Ok(())
}
