//! Integration tests on real NetCDF files with packed variables

use era5_rad::{
    config::{Config, VerticalConfig},
    errors::{Era5RadError, Result},
    guard::{check_consistency, resolve, ConsistencyResult, ResolvePolicy, StoredValues},
    metadata::{compute_variable_summary, describe_packing},
    netcdf_io::{
        find_pressure_axis, load_record_coordinate, load_source, load_source_metadata,
        read_physical, read_variable, remap_dataset, remove_negatives, NetCDFWriter, RawType,
        SIGMA_DIMENSION,
    },
    tools::packing_reports,
    units::UnitsConverter,
    vertical::SigmaGrid,
};
use ndarray::{ArrayD, IxDyn};
use netcdf::{create, open, FileMut};
use std::path::Path;
use tempfile::tempdir;

const FILL: i16 = -32767;

/// Create a file holding `alnid(time, lat)` packed as short with the given parameters
fn create_packed_source(path: &Path, stored: &[i16], scale: f64, offset: f64) -> Result<FileMut> {
    let mut file = create(path)?;
    file.add_dimension("time", stored.len() / 2)?;
    file.add_dimension("lat", 2)?;

    {
        let mut lat = file.add_variable::<f32>("lat", &["lat"])?;
        lat.put_attribute("units", "degrees_north")?;
        lat.put_values(&[10.0f32, 20.0], ..)?;
    }

    let mut var = file.add_variable::<i16>("alnid", &["time", "lat"])?;
    var.put_attribute("scale_factor", scale)?;
    var.put_attribute("add_offset", offset)?;
    var.put_attribute("_FillValue", FILL)?;
    var.put_attribute("units", "(0 - 1)")?;
    var.put_attribute("long_name", "Near IR albedo for diffuse radiation")?;
    var.put_values(stored, ..)?;
    drop(var);
    Ok(file)
}

fn write_packed_source(path: &Path, stored: &[i16], scale: f64, offset: f64) -> Result<()> {
    create_packed_source(path, stored, scale, offset)?;
    Ok(())
}

#[test]
fn test_resolve_packed_files_and_write_unified() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let first_path = temp_dir.path().join("era5_2019.nc");
    let second_path = temp_dir.path().join("era5_2020.nc");
    let output_path = temp_dir.path().join("alnid_unified.nc");

    write_packed_source(&first_path, &[-19990, -19980, FILL, -19970], 0.01, 200.0)?;
    write_packed_source(&second_path, &[-9995, -9990], 0.02, 200.0)?;

    let names = vec!["alnid".to_string()];
    let sources = vec![
        load_source(&first_path, &names)?,
        load_source(&second_path, &names)?,
    ];

    let variable = sources[0].variable("alnid").expect("alnid should be loaded");
    assert_eq!(variable.dimensions, vec!["time", "lat"]);
    assert_eq!(variable.shape, vec![2, 2]);
    assert!(matches!(variable.values, StoredValues::Integer(_)));
    assert_eq!(variable.fill_value, Some(-32767.0));

    match check_consistency(&sources, "alnid")? {
        ConsistencyResult::Inconsistent(divergent) => assert_eq!(divergent[0].source_index, 1),
        ConsistencyResult::Consistent => panic!("Expected Inconsistent packing"),
    }
    assert!(matches!(
        resolve(&sources, "alnid", ResolvePolicy::FailOnMismatch),
        Err(Era5RadError::PackingMismatch { .. })
    ));

    let unified = resolve(&sources, "alnid", ResolvePolicy::UnpackAll)?;
    assert_eq!(unified.shape, vec![3, 2]);

    let template = open(&first_path)?;
    NetCDFWriter::new(&template, &output_path).write_unified(&unified)?;

    let output = open(&output_path)?;
    let var = output.variable("alnid").expect("Variable should exist");
    assert_eq!(var.dimensions()[0].name(), "time");
    assert_eq!(var.dimensions()[0].len(), 3);
    assert_eq!(var.dimensions()[1].len(), 2);
    assert!(var.attribute_value("scale_factor").is_none());
    assert!(var.attribute_value("add_offset").is_none());
    assert!(var.attribute_value("units").is_some());

    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    let expected = [0.1, 0.2, f64::NAN, 0.3, 0.1, 0.2];
    for (actual, expected) in values.iter().zip(expected) {
        if expected.is_nan() {
            assert!(actual.is_nan());
        } else {
            assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
        }
    }

    let lat = output.variable("lat").expect("lat coordinate should be copied");
    let lat_values: Vec<f64> = lat.get_values::<f64, _>(..)?;
    assert_eq!(lat_values, vec![10.0, 20.0]);

    Ok(())
}

/// Add the `time` coordinate, packed when `packing` is given
fn add_time_coordinate(file: &mut FileMut, hours: &[f64], packing: Option<(f64, f64)>) -> Result<()> {
    match packing {
        None => {
            let mut time = file.add_variable::<f64>("time", &["time"])?;
            time.put_attribute("units", "hours since 1900-01-01 00:00:00.0")?;
            time.put_values(hours, ..)?;
        }
        Some((scale, offset)) => {
            #[allow(clippy::cast_possible_truncation)]
            let stored: Vec<i32> = hours.iter().map(|h| ((h - offset) / scale).round() as i32).collect();
            let mut time = file.add_variable::<i32>("time", &["time"])?;
            time.put_attribute("units", "hours since 1900-01-01 00:00:00.0")?;
            time.put_attribute("scale_factor", scale)?;
            time.put_attribute("add_offset", offset)?;
            time.put_values(&stored, ..)?;
        }
    }
    Ok(())
}

#[test]
fn test_resolve_keeps_concatenated_time_axis() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let first_path = temp_dir.path().join("era5_2019.nc");
    let second_path = temp_dir.path().join("era5_2020.nc");
    let untimed_path = temp_dir.path().join("era5_untimed.nc");
    let output_path = temp_dir.path().join("alnid_unified.nc");

    {
        let mut file = create_packed_source(&first_path, &[-19990, -19980, FILL, -19970], 0.01, 200.0)?;
        add_time_coordinate(&mut file, &[10.0, 11.0], None)?;
    }
    {
        // The second file packs its time axis too, with its own parameters
        let mut file = create_packed_source(&second_path, &[-9995, -9990], 0.02, 200.0)?;
        add_time_coordinate(&mut file, &[12.0], Some((0.5, 6.0)))?;
    }
    write_packed_source(&untimed_path, &[1, 2], 0.02, 200.0)?;

    let paths = vec![first_path.clone(), second_path];
    let names = vec!["alnid".to_string()];
    let sources = paths
        .iter()
        .map(|p| load_source(p, &names))
        .collect::<Result<Vec<_>>>()?;
    let unified = resolve(&sources, "alnid", ResolvePolicy::UnpackAll)?;

    let record = load_record_coordinate(&paths, "time")?.expect("both files carry time");
    assert_eq!(record.shape, vec![3]);
    assert_eq!(record.values, vec![10.0, 11.0, 12.0]);

    let template = open(&first_path)?;
    NetCDFWriter::new(&template, &output_path)
        .with_record_coordinate(&record)
        .write_unified(&unified)?;

    let output = open(&output_path)?;
    let time = output.variable("time").expect("time coordinate should be written");
    assert_eq!(time.get_values::<f64, _>(..)?, vec![10.0, 11.0, 12.0]);
    assert!(time.attribute_value("units").is_some());
    assert!(time.attribute_value("scale_factor").is_none());
    assert_eq!(output.variable("alnid").expect("alnid should exist").dimensions()[0].len(), 3);

    // Without a coordinate in every file there is nothing to concatenate
    assert!(load_record_coordinate(&[first_path, untimed_path], "time")?.is_none());
    Ok(())
}

#[test]
fn test_unsigned_64_bit_values_are_read_as_integers() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("counts.nc");
    {
        let mut file = create(&path)?;
        file.add_dimension("time", 3)?;
        let mut var = file.add_variable::<u64>("count", &["time"])?;
        var.put_values(&[1u64, 2, 40_000_000_000], ..)?;
    }

    let file = open(&path)?;
    let raw = file.variable("count").expect("count should exist");
    assert_eq!(RawType::of(&raw)?, RawType::U64);
    assert!(RawType::of(&raw)?.is_integer());

    let variable = read_variable(&file, "count")?;
    assert_eq!(variable.values, StoredValues::Integer(vec![1, 2, 40_000_000_000]));
    Ok(())
}

#[test]
fn test_load_source_skips_coordinates() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("era5.nc");
    write_packed_source(&path, &[1, 2, 3, 4], 0.5, 1.0)?;

    let source = load_source(&path, &[])?;
    let names: Vec<&str> = source.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["alnid"]);

    let metadata = load_source_metadata(&path)?;
    assert_eq!(metadata.packed_variable_names(), vec!["alnid"]);
    assert!(metadata.variables[0].values.is_empty());

    let missing = load_source(&path, &["sp".to_string()]);
    assert!(matches!(missing, Err(Era5RadError::VariableNotFound { .. })));

    let physical = read_physical(&open(&path)?, "alnid")?;
    assert_eq!(physical.shape(), &[2, 2]);
    assert!((physical[[1, 1]] - 3.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_packing_reports() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let a = temp_dir.path().join("a.nc");
    let b = temp_dir.path().join("b.nc");
    let c = temp_dir.path().join("c.nc");
    write_packed_source(&a, &[1, 2], 0.01, 200.0)?;
    write_packed_source(&b, &[1, 2], 0.01, 200.0)?;
    write_packed_source(&c, &[1, 2], 0.01, 199.0)?;

    assert!(packing_reports(&[a.clone(), b.clone()])?.is_empty());

    let reports = packing_reports(&[a, b, c])?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].variable, "alnid");
    assert_eq!(reports[0].divergent[0].source_index, 2);
    assert!((reports[0].divergent[0].offset - 199.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_describe_packing_and_summary() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("era5.nc");
    write_packed_source(&path, &[0, 2, FILL, 4], 0.5, 10.0)?;

    let file = open(&path)?;
    let packed = describe_packing(&file)?;
    assert_eq!(packed.len(), 1);
    assert_eq!(packed[0].name, "alnid");
    assert_eq!(packed[0].data_type, RawType::I16);
    assert_eq!(packed[0].dimensions, vec!["time", "lat"]);
    assert!((packed[0].scale - 0.5).abs() < 1e-12);
    assert!((packed[0].offset - 10.0).abs() < 1e-12);
    assert_eq!(packed[0].fill_value, Some(-32767.0));
    assert_eq!(packed[0].units.as_deref(), Some("(0 - 1)"));

    let summary = compute_variable_summary(&file, "alnid")?;
    assert_eq!(summary.valid, 3);
    assert_eq!(summary.missing, 1);
    assert!((summary.min - 10.0).abs() < 1e-12);
    assert!((summary.max - 12.0).abs() < 1e-12);
    assert!((summary.mean - 11.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_remove_negatives_in_place() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("era5_fluxes.nc");
    // Net fluxes may be negative and are left alone
    {
        let mut file = create_packed_source(&path, &[-20001, -19999, 0, FILL], 0.01, 200.0)?;
        let mut net = file.add_variable::<i16>("msnlwrfcs", &["time", "lat"])?;
        net.put_attribute("scale_factor", 0.01f64)?;
        net.put_attribute("add_offset", 0.0f64)?;
        net.put_values(&[-500i16, -400, 100, 200], ..)?;
    }

    let replaced = remove_negatives(&path, &Config::default())?;
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].variable, "alnid");
    assert_eq!(replaced[0].replaced, 1);

    let file = open(&path)?;
    let alnid: Vec<i16> = file
        .variable("alnid")
        .expect("alnid should exist")
        .get_values::<i16, _>(..)?;
    assert_eq!(alnid, vec![-19999, -19999, 0, FILL]);

    let net: Vec<i16> = file
        .variable("msnlwrfcs")
        .expect("msnlwrfcs should exist")
        .get_values::<i16, _>(..)?;
    assert_eq!(net, vec![-500, -400, 100, 200]);
    Ok(())
}

/// Write `t(time, pressure_level, lat)` and `sp(time, lat)` into separate files
fn write_level_and_single(level_path: &Path, single_path: &Path) -> Result<()> {
    {
        let mut file = create(level_path)?;
        file.add_dimension("time", 1)?;
        file.add_dimension("pressure_level", 3)?;
        file.add_dimension("lat", 2)?;
        {
            let mut level = file.add_variable::<f64>("pressure_level", &["pressure_level"])?;
            level.put_attribute("units", "millibars")?;
            level.put_values(&[500.0, 850.0, 1000.0], ..)?;
        }
        {
            let mut lat = file.add_variable::<f32>("lat", &["lat"])?;
            lat.put_attribute("units", "degrees_north")?;
            lat.put_values(&[45.0f32, 46.0], ..)?;
        }
        {
            let mut t = file.add_variable::<f32>("t", &["time", "pressure_level", "lat"])?;
            t.put_attribute("units", "K")?;
            t.put_values(&[250.0f32, 252.0, 275.0, 270.0, 288.0, 280.0], ..)?;
        }
        {
            let mut q = file.add_variable::<f64>("q", &["time", "pressure_level", "lat"])?;
            q.put_attribute("units", "kg kg**-1")?;
            q.put_values(&[1e-5, 1e-5, 4e-3, 3e-3, 9e-3, 6e-3], ..)?;
        }
        // No pressure axis, copied through a remap
        let mut lsm = file.add_variable::<i16>("lsm", &["time", "lat"])?;
        lsm.put_attribute("scale_factor", 0.5f64)?;
        lsm.put_attribute("add_offset", 0.0f64)?;
        lsm.put_values(&[0i16, 2], ..)?;
    }

    let mut file = create(single_path)?;
    file.add_dimension("time", 1)?;
    file.add_dimension("lat", 2)?;
    {
        let mut sp = file.add_variable::<f64>("sp", &["time", "lat"])?;
        sp.put_attribute("units", "Pa")?;
        sp.put_values(&[101_000.0, 90_000.0], ..)?;
    }
    let mut t2m = file.add_variable::<f64>("t2m", &["time", "lat"])?;
    t2m.put_attribute("units", "K")?;
    t2m.put_values(&[289.0, 279.0], ..)?;
    Ok(())
}

#[test]
fn test_find_pressure_axis() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let level_path = temp_dir.path().join("levels.nc");
    let single_path = temp_dir.path().join("single.nc");
    write_level_and_single(&level_path, &single_path)?;

    let converter = UnitsConverter::default();
    let file = open(&level_path)?;
    let axis = find_pressure_axis(&file, "t", &converter)?;
    assert_eq!(axis.axis, 1);
    assert_eq!(axis.dimension, "pressure_level");
    assert_eq!(axis.levels, vec![500.0, 850.0, 1000.0]);
    assert_eq!(axis.units, "millibars");

    let single = open(&single_path)?;
    match find_pressure_axis(&single, "sp", &converter) {
        Err(Era5RadError::DimensionNotFound { var, .. }) => assert_eq!(var, "sp"),
        other => panic!("Expected DimensionNotFound error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_vertical_remap_dataset_with_default_surface_fields() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let level_path = temp_dir.path().join("levels.nc");
    let single_path = temp_dir.path().join("single.nc");
    let output_path = temp_dir.path().join("sigma.nc");
    write_level_and_single(&level_path, &single_path)?;

    let converter = UnitsConverter::default();
    let grid = SigmaGrid::era_interim();
    let levels_nc = open(&level_path)?;
    let single_nc = open(&single_path)?;

    let remap = remap_dataset(&levels_nc, &single_nc, &VerticalConfig::default(), &grid, &converter)?;
    let remapped: Vec<&str> = remap.remapped.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(remapped, vec!["t", "q"]);
    assert_eq!(remap.copied, vec!["lsm"]);

    let t = &remap.remapped[0];
    assert_eq!(t.level_axis, 1);
    assert_eq!(t.pressure_units, "millibars");
    assert_eq!(t.result.values.shape(), &[1, 37, 2]);
    assert!(t.result.values.iter().all(|v| v.is_finite()));

    // The mountain column (sp 900 hPa) is closed with t2m, not its 850 hPa value
    let bottom = 2.10 + 0.97966 * 900.0;
    let closed = 270.0 + (279.0 - 270.0) * (bottom - 850.0) / 50.0;
    assert!((t.result.values[[0, 36, 1]] - closed).abs() < 1e-6);

    let unclosed = VerticalConfig {
        surface_variables: Default::default(),
        ..VerticalConfig::default()
    };
    let without_t2m = remap_dataset(&levels_nc, &single_nc, &unclosed, &grid, &converter)?;
    assert!((without_t2m.remapped[0].result.values[[0, 36, 1]] - 270.0).abs() < 1e-6);

    // Surface fields are converted to the units of the variable they close
    let mismatched = VerticalConfig {
        surface_variables: [("q".to_string(), "t2m".to_string())].into_iter().collect(),
        ..VerticalConfig::default()
    };
    assert!(matches!(
        remap_dataset(&levels_nc, &single_nc, &mismatched, &grid, &converter),
        Err(Era5RadError::UnitsError { .. })
    ));

    NetCDFWriter::new(&levels_nc, &output_path).write_vertical_remap(&remap)?;

    let output = open(&output_path)?;
    for name in ["t", "q"] {
        let var = output.variable(name).expect("remapped variable should exist");
        assert_eq!(var.dimensions()[1].name(), SIGMA_DIMENSION);
        assert_eq!(var.dimensions()[1].len(), 37);
    }
    let p = output.variable("p").expect("p should exist");
    let pressures = ArrayD::from_shape_vec(IxDyn(&[1, 37, 2]), p.get_values::<f64, _>(..)?)?;
    assert!((pressures[[0, 36, 0]] - (2.10 + 0.97966 * 1010.0)).abs() < 1e-6);

    let lsm = output.variable("lsm").expect("lsm should be copied");
    assert_eq!(lsm.get_values::<f64, _>(..)?, vec![0.0, 1.0]);
    assert!(lsm.attribute_value("scale_factor").is_none());

    let lat: Vec<f64> = output
        .variable("lat")
        .expect("lat coordinate should be copied")
        .get_values::<f64, _>(..)?;
    assert_eq!(lat, vec![45.0, 46.0]);

    let sigma: Vec<i32> = output
        .variable(SIGMA_DIMENSION)
        .expect("sigma_level should exist")
        .get_values::<i32, _>(..)?;
    assert_eq!(sigma.first(), Some(&1));
    assert_eq!(sigma.last(), Some(&37));
    Ok(())
}
