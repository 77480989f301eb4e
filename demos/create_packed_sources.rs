//! Creates sample ERA5-like NetCDF files for trying out era5_rad.
//!
//! Two single-level files hold the same variables packed with different
//! `scale_factor`/`add_offset` pairs, the way separate CDS downloads arrive.
//! A pressure-level file with temperature goes with the first of them.

use era5_rad::packing::PackingParams;
use netcdf::create;
use std::path::Path;

const NTIME: usize = 3;
const NLAT: usize = 4;
const NLON: usize = 5;
const FILL: i16 = -32767;
const LEVELS: [f64; 4] = [500.0, 700.0, 850.0, 1000.0];

/// Packing parameters spreading `min..=max` over the short range, as CDS does
fn packing_for(min: f64, max: f64) -> PackingParams {
    let scale = (max - min) / 65_533.0;
    let offset = (max + min) / 2.0;
    PackingParams::new(scale, offset)
}

fn field(seed: f64, f: impl Fn(usize, usize, usize) -> f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(NTIME * NLAT * NLON);
    for t in 0..NTIME {
        for y in 0..NLAT {
            for x in 0..NLON {
                values.push(seed + f(t, y, x));
            }
        }
    }
    values
}

fn add_coordinates(file: &mut netcdf::FileMut, first_hour: f64) -> Result<(), Box<dyn std::error::Error>> {
    file.add_dimension("time", NTIME)?;
    file.add_dimension("latitude", NLAT)?;
    file.add_dimension("longitude", NLON)?;

    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_attribute("units", "hours since 1900-01-01 00:00:00.0")?;
        time.put_attribute("calendar", "gregorian")?;
        let hours: Vec<f64> = (0..NTIME).map(|i| first_hour + i as f64).collect();
        time.put_values(&hours, ..)?;
    }
    {
        let mut lat = file.add_variable::<f32>("latitude", &["latitude"])?;
        lat.put_attribute("units", "degrees_north")?;
        let values: Vec<f32> = (0..NLAT).map(|i| 47.0 - i as f32 * 0.25).collect();
        lat.put_values(&values, ..)?;
    }
    {
        let mut lon = file.add_variable::<f32>("longitude", &["longitude"])?;
        lon.put_attribute("units", "degrees_east")?;
        let values: Vec<f32> = (0..NLON).map(|i| 7.0 + i as f32 * 0.25).collect();
        lon.put_values(&values, ..)?;
    }
    Ok(())
}

fn add_packed(
    file: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    units: &str,
    physical: &[f64],
) -> Result<PackingParams, Box<dyn std::error::Error>> {
    let min = physical.iter().copied().fold(f64::INFINITY, f64::min);
    let max = physical.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let packing = packing_for(min, max);
    let stored: Vec<i16> = packing
        .pack_all(physical, Some(i64::from(FILL)))
        .into_iter()
        .map(|v| v.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16)
        .collect();

    let mut var = file.add_variable::<i16>(name, dims)?;
    var.put_attribute("scale_factor", packing.scale)?;
    var.put_attribute("add_offset", packing.offset)?;
    var.put_attribute("_FillValue", FILL)?;
    var.put_attribute("missing_value", FILL)?;
    var.put_attribute("units", units)?;
    var.put_values(&stored, ..)?;
    Ok(packing)
}

fn create_single_level(path: &Path, first_hour: f64, seed: f64) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut file = create(path)?;
    file.add_attribute("Conventions", "CF-1.6")?;
    add_coordinates(&mut file, first_hour)?;
    let dims = ["time", "latitude", "longitude"];

    // Terrain rises towards the south-east corner
    let sp = field(101_000.0 - seed * 100.0, |_, y, x| -4_000.0 * (y + x) as f64);
    let alnid = field(0.1 + seed * 0.01, |t, y, x| 0.02 * ((t + y + x) % 5) as f64);
    // Clear-sky downward flux with small negative unpack artifacts at night
    let ssrdc = field(-0.3, |t, y, _| if t == 0 { 0.0 } else { 150.0 * (y + 1) as f64 });

    for (name, units, values) in [
        ("sp", "Pa", &sp),
        ("alnid", "(0 - 1)", &alnid),
        ("msdwswrfcs", "W m**-2", &ssrdc),
    ] {
        let packing = add_packed(&mut file, name, &dims, units, values)?;
        println!(
            "      {:<11} scale_factor={:.6e} add_offset={:.6}",
            name, packing.scale, packing.offset
        );
    }
    Ok(())
}

fn create_pressure_level(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut file = create(path)?;
    add_coordinates(&mut file, 1_043_112.0)?;
    file.add_dimension("level", LEVELS.len())?;
    {
        let mut level = file.add_variable::<f64>("level", &["level"])?;
        level.put_attribute("units", "millibars")?;
        level.put_attribute("long_name", "pressure_level")?;
        level.put_values(&LEVELS, ..)?;
    }

    let mut t = Vec::with_capacity(NTIME * LEVELS.len() * NLAT * NLON);
    for time in 0..NTIME {
        for &p in &LEVELS {
            for y in 0..NLAT {
                for x in 0..NLON {
                    // Dry adiabat-like profile with a weak diurnal signal
                    t.push(288.0 * (p / 1000.0).powf(0.19) + time as f64 - 0.5 * (y + x) as f64);
                }
            }
        }
    }
    add_packed(
        &mut file,
        "t",
        &["time", "level", "latitude", "longitude"],
        "K",
        &t,
    )?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let first = Path::new("era5_single_2019.nc");
    let second = Path::new("era5_single_2020.nc");
    let levels = Path::new("era5_levels_2019.nc");

    println!("🔨 Creating packed ERA5-like sources");
    println!("   {}", first.display());
    create_single_level(first, 1_043_112.0, 0.0)?;
    println!("   {}", second.display());
    create_single_level(second, 1_051_872.0, 3.0)?;
    println!("   {}", levels.display());
    create_pressure_level(levels)?;

    println!("\n🧪 Try:");
    println!("   cargo run -- check {} {}", first.display(), second.display());
    println!(
        "   cargo run -- resolve {} {} --var alnid -o alnid.nc",
        first.display(),
        second.display()
    );
    println!("   cargo run -- scan {} --var msdwswrfcs --range 0:", first.display());
    println!("   cargo run -- mask {} {}", levels.display(), first.display());

    Ok(())
}
