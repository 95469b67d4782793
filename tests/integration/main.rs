mod mock_hw;
mod scenario_tests;
