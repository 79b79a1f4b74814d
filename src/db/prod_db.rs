use std::path::PathBuf;

use super::sds::token_launches_archive::TokenLaunchesArchive;

pub struct ProdDb {}

impl ProdDb {
    /// Latest export of the SDS token launches, read by the dashboard from
    /// `./data/tokens-data.json`.
    pub fn sds_token_launches() -> TokenLaunchesArchive {
        TokenLaunchesArchive {
            project_id: "aff-2025-fe-14wnaz".to_string(),
            dataset_id: "sds_tokens".to_string(),
            table_id: "token_launches_json".to_string(),
            json_path: PathBuf::from("./data/tokens-data.json"),
        }
    }
}
