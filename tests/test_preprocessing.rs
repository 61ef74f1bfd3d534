//! Integration tests for the cleaning and feature pipeline

use housing_mlp::preprocessing::{
    train_test_split, Encoder, EncoderType, FeatureMatrix, HousingCleaner, OutlierDetector, PreprocessingConfig,
    StandardScaler,
};
use housing_mlp::config::PipelineConfig;
use housing_mlp::pipeline::TrainingPipeline;
use housing_mlp::utils::DataLoader;
use ndarray::Axis;
use tempfile::tempdir;

const LISTINGS: &str = "\
Price (PHP),Bedrooms,Bath,Floor_area (sqm),Land_area (sqm),Type
\"â‚±3,500,000\",2,1,45,60,Condo
\"â‚±3,500,000\",2,1,45,60,Condo
\"₱ 7,250,000 \",3,,90,120,House
\"₱12,000,000\",4,3,150,,House
not listed,3,2,100,110,House
\"₱5,000,000\",,1,60,80,Condo
\"₱9,800,000\",3,2,n/a,140,House
";

#[test]
fn test_cleaning_from_csv() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.csv");
    std::fs::write(&path, LISTINGS).unwrap();

    let df = DataLoader::new().load_auto(&path).unwrap();
    assert_eq!(df.height(), 7);

    // "n/a" is read as missing
    assert_eq!(df.column("Floor_area (sqm)").unwrap().null_count(), 1);

    let (cleaned, report) = HousingCleaner::new(PreprocessingConfig::default()).clean(&df).unwrap();
    assert_eq!(report.duplicates_removed, 1);
    // unparsable price, missing bedrooms and the "n/a" floor area
    assert_eq!(report.missing_essential_removed, 3);
    assert_eq!(cleaned.height(), 3);
    assert_eq!(report.rows_after_cleaning, 3);

    let target = cleaned.column("Price_millions").unwrap().f64().unwrap().clone();
    let prices: Vec<f64> = target.into_iter().flatten().collect();
    assert_eq!(prices, vec![3.5, 7.25, 12.0]);
    assert!(cleaned.column("Price (PHP)").is_err());
    assert_eq!(cleaned.column("Floor_area (sqm)").unwrap().null_count(), 0);

    // medians over the surviving rows only
    assert_eq!(report.median_fills["Bath"], (1, 2.0));
    assert_eq!(report.median_fills["Land_area (sqm)"], (1, 90.0));
}

#[test]
fn test_na_token_keeps_numeric_column_numeric() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.csv");
    let mut csv = String::from("Price (PHP),Bedrooms,Bath,Floor_area (sqm),Land_area (sqm),Latitude,Type\n");
    for i in 0..40 {
        let latitude = if i == 5 { "NA".to_string() } else { format!("{:.2}", 14.0 + i as f64 * 0.01) };
        csv.push_str(&format!(
            "\"₱{},000,000\",{},{},{},{},{},{}\n",
            3 + i % 6,
            1 + i % 4,
            1 + i % 2,
            40 + i * 3,
            60 + i * 4,
            latitude,
            if i % 2 == 0 { "Condo" } else { "House" }
        ));
    }
    std::fs::write(&path, csv).unwrap();

    let pipeline = TrainingPipeline::new(PipelineConfig::default().with_data_path(&path)).unwrap();
    let prepared = pipeline.load_and_prepare().unwrap();

    let names = &prepared.features.feature_names;
    assert!(!names.iter().any(|n| n.starts_with("Latitude_")));
    assert_eq!(
        names,
        &vec!["Bedrooms", "Bath", "Floor_area (sqm)", "Land_area (sqm)", "Latitude", "Type_Condo", "Type_House"]
    );
    let latitude = prepared.features.x.column(4);
    assert!(latitude.iter().all(|v| (14.0..14.4).contains(v)));
}

#[test]
fn test_features_split_and_scale() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listings.csv");
    let mut csv = String::from("Price (PHP),Bedrooms,Bath,Floor_area (sqm),Land_area (sqm),Type\n");
    for i in 0..50 {
        let kind = if i % 2 == 0 { "Condo" } else { "House" };
        csv.push_str(&format!(
            "\"₱{},000,000\",{},{},{},{},{}\n",
            3 + i % 6,
            1 + i % 4,
            1 + i % 2,
            40 + i * 3,
            60 + i * 4,
            kind
        ));
    }
    std::fs::write(&path, csv).unwrap();

    let config = PreprocessingConfig::default();
    let df = DataLoader::new().load_auto(&path).unwrap();
    let (cleaned, _) = HousingCleaner::new(config.clone()).clean(&df).unwrap();

    let mut detector = OutlierDetector::new(config.outlier_method.clone(), config.outlier_strategy)
        .with_columns(config.outlier_columns.clone());
    let trimmed = detector.apply(&cleaned).unwrap();
    assert!(trimmed.height() < cleaned.height());

    let encoded = Encoder::new(EncoderType::OneHot).fit_transform(&trimmed).unwrap();
    let fm = FeatureMatrix::from_frame(&encoded, "Price_millions", true).unwrap();
    assert_eq!(
        fm.feature_names,
        vec!["Bedrooms", "Bath", "Floor_area (sqm)", "Land_area (sqm)", "Type_Condo", "Type_House"]
    );

    let split = train_test_split(&fm.x, &fm.y, 0.2, 42).unwrap();
    let n = fm.n_samples();
    assert_eq!(split.x_valid.nrows(), (0.2 * n as f64).ceil() as usize);

    let mut scaler = StandardScaler::new().with_feature_names(fm.feature_names.clone());
    let scaled = scaler.fit_transform(&split.x_train).unwrap();
    for mean in scaled.mean_axis(Axis(0)).unwrap() {
        assert!(mean.abs() < 1e-9);
    }
    let restored = scaler.inverse_transform(&scaled).unwrap();
    assert!((&restored - &split.x_train).iter().all(|d| d.abs() < 1e-9));
}
