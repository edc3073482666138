use cashflow_forecast::error::ForecastError;
use forecast_math::MathError;
use std::io;

#[test]
fn test_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
    assert!(matches!(ForecastError::from(io_error), ForecastError::IoError(_)));

    let math_error = MathError::CalculationError("singular matrix".to_string());
    match ForecastError::from(math_error) {
        ForecastError::ModelExecution(message) => assert!(message.contains("singular matrix")),
        other => panic!("Expected ModelExecution, got {:?}", other),
    }

    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(ForecastError::from(json_error), ForecastError::InvalidConfig(_)));
}

#[test]
fn test_error_display() {
    let error = ForecastError::NotFitted("ARIMA(1,1,1) is in state Unfit".to_string());
    assert_eq!(
        error.to_string(),
        "Model not fitted: ARIMA(1,1,1) is in state Unfit"
    );

    let error = ForecastError::AllModelsFailed(vec!["a: boom".to_string(), "b: bang".to_string()]);
    assert_eq!(error.to_string(), "All ensemble members failed: a: boom; b: bang");
}
