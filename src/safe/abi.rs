//! Contract interface of the multisig account

use alloy_sol_types::sol;

sol! {
    #[allow(missing_docs)]
    interface ISafe {
        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes signatures
        ) external payable returns (bool success);

        function getThreshold() external view returns (uint256 threshold);

        function getOwners() external view returns (address[] owners);

        function isOwner(address owner) external view returns (bool isOwner);

        function nonce() external view returns (uint256 nonce);

        function getChainId() external view returns (uint256 chainId);

        function domainSeparator() external view returns (bytes32 separator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;

    #[test]
    fn test_selectors() {
        assert_eq!(
            hex::encode(ISafe::execTransactionCall::SELECTOR),
            "6a761202"
        );
        assert_eq!(hex::encode(ISafe::getThresholdCall::SELECTOR), "e75235b8");
        assert_eq!(hex::encode(ISafe::nonceCall::SELECTOR), "affed0e0");
        assert_eq!(hex::encode(ISafe::domainSeparatorCall::SELECTOR), "f698da25");
    }
}
