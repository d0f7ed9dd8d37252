use crate::model::role::Role;

pub struct CreateUser {
    pub user_name: String,
    pub email: String,
    pub role: Role,
}
